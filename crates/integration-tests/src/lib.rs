//! Integration tests for Mealcart.
//!
//! Every test drives the [`Storefront`] facade against an [`InMemoryStore`],
//! using fault injection and call counters to observe rollback, partial
//! transfers and cache hits.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mealcart-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `membership` - toggles, removal by id, rollback
//! - `transfer` - cart to orders
//! - `cache` - staleness and refetching
//! - `scoping` - owner isolation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mealcart_core::{CartItem, Email, FavoriteItem, MealId, OwnerId};
use mealcart_sync::mapper::MembershipRecord;
use mealcart_sync::store::{Filter, RawDocument};
use mealcart_sync::{
    CacheConfig, CollectionIds, DocumentStore, InMemoryStore, StaticIdentity, StoreError,
    Storefront,
};
use serde_json::{Map, Value, json};

pub const ANN: &str = "ann@example.com";
pub const BOB: &str = "bob@example.com";

/// Catalog every context starts with: `(id, name, price)`.
pub const MEALS: [(&str, &str, f64); 3] = [
    ("pho", "Pho", 12.5),
    ("laksa", "Laksa", 14.0),
    ("banh-mi", "Banh mi", 8.75),
];

/// Parse a fixture email.
///
/// # Panics
///
/// Panics if `s` is not a valid email.
#[must_use]
pub fn email(s: &str) -> Email {
    Email::parse(s).unwrap_or_else(|e| panic!("fixture email {s}: {e}"))
}

/// Owner key of a fixture email.
#[must_use]
pub fn owner(s: &str) -> OwnerId {
    email(s).owner_id()
}

/// Build a raw document from a JSON object literal.
#[must_use]
pub fn doc(value: Value) -> RawDocument {
    match value {
        Value::Object(map) => RawDocument::new(map),
        _ => RawDocument::default(),
    }
}

/// A storefront over a seeded in-memory store, signed in as [`ANN`].
pub struct TestContext {
    pub store: InMemoryStore,
    pub identity: StaticIdentity,
    pub storefront: Storefront,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::wrapping(|store| Arc::new(store)).await
    }

    /// Like [`TestContext::new`], with the facade talking to `wrap(store)`.
    pub async fn wrapping<F>(wrap: F) -> Self
    where
        F: FnOnce(InMemoryStore) -> Arc<dyn DocumentStore>,
    {
        let store = InMemoryStore::new();
        for (day, (id, name, price)) in (1..).zip(MEALS) {
            store
                .seed(
                    "meals",
                    doc(json!({
                        "$id": id, "name": name, "price": price,
                        "$createdAt": format!("2024-05-{day:02}T10:00:00.000+00:00"),
                        "image": format!("https://img.test/{id}.png"),
                        "description": format!("{name} of the day"),
                    })),
                )
                .await;
        }

        let identity = StaticIdentity::signed_in(email(ANN));
        let storefront = Storefront::new(
            wrap(store.clone()),
            Arc::new(identity.clone()),
            CollectionIds::default(),
            &CacheConfig::default(),
        );

        Self {
            store,
            identity,
            storefront,
        }
    }

    /// The signed-in owner.
    #[must_use]
    pub fn ann(&self) -> OwnerId {
        owner(ANN)
    }

    /// Seed a cart item for `owner_email` copying meal `meal`.
    pub async fn seed_cart_item(&self, owner_email: &str, meal: &str) -> String {
        let id = CartItem::membership_id(&owner(owner_email), &MealId::new(meal));
        self.seed_membership("cart", &id, owner_email, meal).await;
        id
    }

    /// Seed a favorite for `owner_email` of meal `meal`.
    pub async fn seed_favorite(&self, owner_email: &str, meal: &str) -> String {
        let id = FavoriteItem::membership_id(&owner(owner_email), &MealId::new(meal));
        self.seed_membership("favorites", &id, owner_email, meal).await;
        id
    }

    async fn seed_membership(&self, collection: &str, id: &str, owner_email: &str, meal: &str) {
        let (name, price) = MEALS
            .iter()
            .find(|(meal_id, _, _)| *meal_id == meal)
            .map_or((meal, 1.0), |(_, name, price)| (*name, *price));
        self.store
            .seed(
                collection,
                doc(json!({
                    "$id": id, "mealId": meal, "user": owner_email,
                    "name": name, "price": price,
                    "image": format!("https://img.test/{meal}.png"),
                })),
            )
            .await;
    }

    /// Stored documents in `collection` pointing at `meal`.
    pub async fn count_for_meal(&self, collection: &str, meal: &str) -> usize {
        self.store
            .documents(collection)
            .await
            .iter()
            .filter(|d| d.get("mealId") == Some(&Value::from(meal)))
            .count()
    }
}

/// Store wrapper that answers whole-owner list calls late.
///
/// The inner store is read first and the response held back for `delay`,
/// so anything committed meanwhile is missing from it. Lists narrowed to
/// one meal (membership lookups) are not delayed.
pub struct DelayedLists {
    inner: InMemoryStore,
    collection: &'static str,
    delay: Duration,
}

impl DelayedLists {
    #[must_use]
    pub const fn new(inner: InMemoryStore, collection: &'static str, delay: Duration) -> Self {
        Self {
            inner,
            collection,
            delay,
        }
    }
}

#[async_trait]
impl DocumentStore for DelayedLists {
    async fn list_documents(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, StoreError> {
        let documents = self.inner.list_documents(collection, filter).await?;
        let per_meal = filter.predicates().iter().any(|(field, _)| field == "mealId");
        if collection == self.collection && !per_meal {
            tokio::time::sleep(self.delay).await;
        }
        Ok(documents)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<RawDocument, StoreError> {
        self.inner.get_document(collection, id).await
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawDocument, StoreError> {
        self.inner.create_document(collection, id, fields).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete_document(collection, id).await
    }
}
