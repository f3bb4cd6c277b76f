//! Synchronization-layer configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DOCSTORE_ENDPOINT` - Document store API root (e.g., <https://cloud.appwrite.io/v1>)
//! - `DOCSTORE_PROJECT_ID` - Project the collections belong to
//! - `DOCSTORE_DATABASE_ID` - Database holding the storefront collections
//! - `DOCSTORE_API_KEY` - API key (high entropy, not a placeholder)
//!
//! ## Optional
//! - `DOCSTORE_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `MEALCART_MEALS_COLLECTION` - Meals collection id (default: meals)
//! - `MEALCART_FAVORITES_COLLECTION` - Favorites collection id (default: favorites)
//! - `MEALCART_CART_COLLECTION` - Cart collection id (default: cart)
//! - `MEALCART_ORDERS_COLLECTION` - Orders collection id (default: orders)
//! - `MEALCART_CACHE_TTL_SECS` - Query cache time-to-live (default: 300)
//! - `MEALCART_CACHE_CAPACITY` - Query cache entry limit (default: 1000)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use mealcart_core::Collection;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Synchronization-layer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote document store connection
    pub store: DocumentStoreConfig,
    /// Collection ids in the remote store
    pub collections: CollectionIds,
    /// Query cache tuning
    pub cache: CacheConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Remote document store connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct DocumentStoreConfig {
    /// API root, e.g. `https://cloud.appwrite.io/v1`
    pub endpoint: Url,
    /// Project id sent with every request
    pub project_id: String,
    /// Database holding the collections
    pub database_id: String,
    /// Server API key
    pub api_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for DocumentStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStoreConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("project_id", &self.project_id)
            .field("database_id", &self.database_id)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Collection ids for each logical collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIds {
    pub meals: String,
    pub favorites: String,
    pub cart: String,
    pub orders: String,
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            meals: Collection::Meals.default_id().to_string(),
            favorites: Collection::Favorites.default_id().to_string(),
            cart: Collection::Cart.default_id().to_string(),
            orders: Collection::Orders.default_id().to_string(),
        }
    }
}

impl CollectionIds {
    /// The remote id of `collection`.
    #[must_use]
    pub fn id_of(&self, collection: Collection) -> &str {
        match collection {
            Collection::Meals => &self.meals,
            Collection::Favorites => &self.favorites,
            Collection::Cart => &self.cart,
            Collection::Orders => &self.orders,
        }
    }
}

/// Query cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a snapshot may be served before it expires outright
    pub ttl: Duration,
    /// Maximum number of cached snapshots
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300), // 5 minutes
            capacity: 1000,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            store: DocumentStoreConfig::from_env()?,
            collections: CollectionIds::from_env(),
            cache: CacheConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

impl DocumentStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let endpoint = get_required_env("DOCSTORE_ENDPOINT")?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("DOCSTORE_ENDPOINT".to_string(), e.to_string())
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(ConfigError::InvalidEnvVar(
                "DOCSTORE_ENDPOINT".to_string(),
                "must be an absolute http(s) URL".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            project_id: get_required_env("DOCSTORE_PROJECT_ID")?,
            database_id: get_required_env("DOCSTORE_DATABASE_ID")?,
            api_key: get_validated_secret("DOCSTORE_API_KEY")?,
            timeout: Duration::from_secs(get_parsed_env("DOCSTORE_TIMEOUT_SECS", 10)?),
        })
    }
}

impl CollectionIds {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            meals: get_env_or_default("MEALCART_MEALS_COLLECTION", &defaults.meals),
            favorites: get_env_or_default("MEALCART_FAVORITES_COLLECTION", &defaults.favorites),
            cart: get_env_or_default("MEALCART_CART_COLLECTION", &defaults.cart),
            orders: get_env_or_default("MEALCART_ORDERS_COLLECTION", &defaults.orders),
        }
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            ttl: Duration::from_secs(get_parsed_env(
                "MEALCART_CACHE_TTL_SECS",
                defaults.ttl.as_secs(),
            )?),
            capacity: get_parsed_env("MEALCART_CACHE_CAPACITY", defaults.capacity)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional numeric environment variable.
fn get_parsed_env(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("zzzz") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_placeholder_api_key_rejected() {
        let err = validate_secret_strength("put-your-api-key", "DOCSTORE_API_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(var, _) if var == "DOCSTORE_API_KEY"));
    }

    #[test]
    fn test_low_entropy_api_key_rejected() {
        assert!(validate_secret_strength("abababababababab", "DOCSTORE_API_KEY").is_err());
    }

    #[test]
    fn test_random_api_key_accepted() {
        assert!(validate_secret_strength("s3Kq9!vT2#pL7@wZ4$nR8&", "DOCSTORE_API_KEY").is_ok());
    }

    #[test]
    fn test_collection_ids_default_to_collection_names() {
        let ids = CollectionIds::default();
        assert_eq!(ids.id_of(Collection::Cart), "cart");
        assert_eq!(ids.id_of(Collection::Orders), "orders");
    }

    #[test]
    fn test_store_config_debug_redacts_key() {
        let config = DocumentStoreConfig {
            endpoint: Url::parse("https://docs.test/v1").unwrap(),
            project_id: "proj".to_string(),
            database_id: "db".to_string(),
            api_key: SecretString::from("super_secret_key_value"),
            timeout: Duration::from_secs(10),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("https://docs.test/v1"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_key_value"));
    }
}
