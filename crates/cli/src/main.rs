//! Mealcart CLI - browse the catalog and manage favorites, cart and orders.
//!
//! # Usage
//!
//! ```bash
//! # List the catalog, newest first
//! mealcart meals --newest
//!
//! # Add a meal to the catalog
//! mealcart meal create -n "Pho" -p 12.50 -i https://img.example.com/pho.png -c soup
//!
//! # Toggle a favorite and show the cart
//! mealcart --user ann@example.com favorites toggle <meal-id>
//! mealcart --user ann@example.com cart list
//!
//! # Turn the cart into orders
//! mealcart --user ann@example.com checkout
//! ```
//!
//! # Commands
//!
//! - `meals` - List the catalog
//! - `meal create|delete` - Manage catalog meals
//! - `favorites list|toggle|remove` - Manage favorites
//! - `cart list|toggle|remove|total` - Manage the cart
//! - `checkout` - Transfer the cart to orders
//! - `orders` - List orders
//!
//! Connection settings are read from the environment; see
//! [`mealcart_sync::config`].

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::{Parser, Subcommand};
use mealcart_core::Price;
use mealcart_sync::SyncConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mealcart")]
#[command(author, version, about = "Mealcart storefront CLI")]
struct Cli {
    /// Email of the user to act as
    #[arg(short, long, global = true, env = "MEALCART_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog
    Meals {
        /// Newest meals first
        #[arg(long)]
        newest: bool,
    },
    /// Manage catalog meals
    Meal {
        #[command(subcommand)]
        action: MealAction,
    },
    /// Manage favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Turn every cart item into an order
    Checkout,
    /// List orders
    Orders,
}

#[derive(Subcommand)]
enum MealAction {
    /// Add a meal to the catalog
    Create {
        /// Meal name
        #[arg(short, long)]
        name: String,

        /// Price, e.g. 12.50
        #[arg(short, long, value_parser = parse_price)]
        price: Price,

        /// URL of an already uploaded image
        #[arg(short, long)]
        image: String,

        /// Category
        #[arg(short, long)]
        category: Option<String>,

        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Remove a meal from the catalog
    Delete {
        /// Meal id
        id: String,
    },
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List,
    /// Favorite a meal, or unfavorite it
    Toggle {
        /// Meal id
        meal: String,
    },
    /// Remove a favorite by its id
    Remove {
        /// Favorite id
        id: String,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List the cart
    List,
    /// Add a meal to the cart, or take it out
    Toggle {
        /// Meal id
        meal: String,
    },
    /// Remove a cart item by its id
    Remove {
        /// Cart item id
        id: String,
    },
    /// Show item count and total
    Total,
}

fn parse_price(s: &str) -> Result<Price, String> {
    let amount: rust_decimal::Decimal = s.trim().parse().map_err(|e| format!("{e}"))?;
    Price::new(amount).ok_or_else(|| "price cannot be negative".to_string())
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mealcart_sync=info,mealcart_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, &config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storefront = commands::connect(config, cli.user.as_deref()).await?;

    match cli.command {
        Commands::Meals { newest } => commands::catalog::list(&storefront, newest).await?,
        Commands::Meal { action } => match action {
            MealAction::Create {
                name,
                price,
                image,
                category,
                description,
            } => {
                let meal = mealcart_core::NewMeal {
                    name,
                    price,
                    image,
                    category,
                    description,
                };
                commands::catalog::create(&storefront, &meal).await?;
            }
            MealAction::Delete { id } => commands::catalog::delete(&storefront, &id).await?,
        },
        Commands::Favorites { action } => match action {
            FavoritesAction::List => commands::favorites::list(&storefront).await?,
            FavoritesAction::Toggle { meal } => {
                commands::favorites::toggle(&storefront, &meal).await?;
            }
            FavoritesAction::Remove { id } => commands::favorites::remove(&storefront, &id).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::List => commands::cart::list(&storefront).await?,
            CartAction::Toggle { meal } => commands::cart::toggle(&storefront, &meal).await?,
            CartAction::Remove { id } => commands::cart::remove(&storefront, &id).await?,
            CartAction::Total => commands::cart::total(&storefront).await?,
        },
        Commands::Checkout => commands::orders::checkout(&storefront).await?,
        Commands::Orders => commands::orders::list(&storefront).await?,
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("12.50").unwrap(), Price::from_cents(1250));
        assert!(parse_price("-1").is_err());
        assert!(parse_price("abc").is_err());
    }

    #[test]
    fn test_user_flag_is_global() {
        let cli = Cli::try_parse_from(["mealcart", "cart", "total", "--user", "ann@example.com"])
            .unwrap();
        assert_eq!(cli.user.as_deref(), Some("ann@example.com"));
    }
}
