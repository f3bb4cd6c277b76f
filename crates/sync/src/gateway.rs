//! Collection gateways.
//!
//! A [`Gateway`] wraps list/get/create/remove for one collection and maps
//! every document through the entity mapper. Owner-scoped collections filter
//! by owner on the server and again on the client, so a misbehaving store can
//! never leak another user's records.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use mealcart_core::{MealId, MealRecord, NewMeal, OwnerId};

use crate::config::CollectionIds;
use crate::error::{Result, SyncError};
use crate::mapper::{self, MembershipRecord, OwnedRecord, StoredRecord, fields};
use crate::store::{DocumentStore, Filter};

/// Records returned by a list call.
#[derive(Debug, Clone)]
pub struct Listing<R> {
    /// Records that mapped cleanly.
    pub records: Vec<R>,
    /// Documents excluded because the mapper rejected them.
    pub rejected: Vec<SyncError>,
}

impl<R> Default for Listing<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Access to one collection, typed by its record.
pub struct Gateway<R> {
    store: Arc<dyn DocumentStore>,
    collection_id: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Gateway<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection_id: self.collection_id.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: StoredRecord> Gateway<R> {
    /// Create a gateway over `collection_id` in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection_id: impl Into<String>) -> Self {
        Self {
            store,
            collection_id: collection_id.into(),
            _record: PhantomData,
        }
    }

    /// The remote collection id.
    #[must_use]
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// List documents matching `filter`.
    ///
    /// Malformed documents are excluded and reported in
    /// [`Listing::rejected`]; they never fail the whole list.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if the store call fails.
    #[instrument(skip(self, filter), fields(collection = %R::COLLECTION))]
    pub async fn list(&self, filter: &Filter) -> Result<Listing<R>> {
        let docs = self
            .store
            .list_documents(&self.collection_id, filter)
            .await
            .map_err(|e| SyncError::from_list(e, R::COLLECTION))?;

        let mut listing = Listing::default();
        for doc in &docs {
            match mapper::map_document::<R>(doc) {
                Ok(record) => listing.records.push(record),
                Err(err) => {
                    warn!(error = %err, "Excluding malformed record");
                    listing.rejected.push(err);
                }
            }
        }
        debug!(
            count = listing.records.len(),
            rejected = listing.rejected.len(),
            "Listed documents"
        );
        Ok(listing)
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if no such document exists,
    /// `SyncError::MalformedRecord` if it cannot be mapped, or
    /// `SyncError::StoreUnavailable` on transport failure.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn get(&self, id: &str) -> Result<R> {
        let doc = self
            .store
            .get_document(&self.collection_id, id)
            .await
            .map_err(|e| SyncError::from_store(e, R::COLLECTION, id))?;
        mapper::map_document(&doc)
    }

    /// Create a record under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Conflict` if the id is taken, or
    /// `SyncError::StoreUnavailable` on transport failure.
    #[instrument(skip(self, fields), fields(collection = %R::COLLECTION))]
    pub async fn create(&self, id: &str, fields: Map<String, Value>) -> Result<R> {
        let doc = self
            .store
            .create_document(&self.collection_id, id, fields)
            .await
            .map_err(|e| SyncError::from_store(e, R::COLLECTION, id))?;
        mapper::map_document(&doc)
    }

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if no such document exists, or
    /// `SyncError::StoreUnavailable` on transport failure.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store
            .delete_document(&self.collection_id, id)
            .await
            .map_err(|e| SyncError::from_store(e, R::COLLECTION, id))
    }
}

impl<R: OwnedRecord> Gateway<R> {
    /// List the records belonging to `owner`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if the store call fails.
    pub async fn list_owned(&self, owner: &OwnerId) -> Result<Listing<R>> {
        let mut listing = self
            .list(&Filter::all().eq(fields::OWNER, owner.as_str()))
            .await?;
        let before = listing.records.len();
        listing.records.retain(|record| record.owner_id() == owner);
        if listing.records.len() != before {
            warn!(
                collection = %R::COLLECTION,
                dropped = before - listing.records.len(),
                "Store returned records of another owner"
            );
        }
        Ok(listing)
    }

    /// Fetch one record, treating another owner's record as absent.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if no such document exists or it belongs
    /// to someone else, plus the errors of [`Gateway::get`].
    pub async fn get_owned(&self, id: &str, owner: &OwnerId) -> Result<R> {
        let record = self.get(id).await?;
        if record.owner_id() == owner {
            Ok(record)
        } else {
            debug!(collection = %R::COLLECTION, id, "Record belongs to another owner");
            Err(SyncError::NotFound {
                collection: R::COLLECTION,
                id: id.to_owned(),
            })
        }
    }
}

impl<R: MembershipRecord> Gateway<R> {
    /// Records linking `owner` to `meal`. Normally zero or one.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if the store call fails.
    #[instrument(skip(self), fields(collection = %R::COLLECTION))]
    pub async fn memberships(&self, owner: &OwnerId, meal: &MealId) -> Result<Vec<R>> {
        let filter = Filter::all()
            .eq(fields::MEAL_ID, meal.as_str())
            .eq(fields::OWNER, owner.as_str());
        let listing = self.list(&filter).await?;
        Ok(listing
            .records
            .into_iter()
            .filter(|record| record.owner_id() == owner && record.meal_id() == meal)
            .collect())
    }
}

impl Gateway<MealRecord> {
    /// Add a meal to the catalog under a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` on transport failure.
    pub async fn create_meal(&self, meal: &NewMeal) -> Result<MealRecord> {
        let id = MealId::generate();
        self.create(id.as_str(), mapper::meal_fields(meal)).await
    }
}

/// Sort meals newest first.
pub fn sort_newest(meals: &mut [MealRecord]) {
    meals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Gateway factory over one store and its collection ids.
#[derive(Clone)]
pub struct Gateways {
    store: Arc<dyn DocumentStore>,
    collections: CollectionIds,
}

impl Gateways {
    /// Gateways over `store`, resolving collection ids through `collections`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collections: CollectionIds) -> Self {
        Self { store, collections }
    }

    /// The gateway for `R`'s collection.
    #[must_use]
    pub fn of<R: StoredRecord>(&self) -> Gateway<R> {
        Gateway::new(
            Arc::clone(&self.store),
            self.collections.id_of(R::COLLECTION),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};
    use mealcart_core::{CartItem, Collection, Price};
    use serde_json::json;

    use super::*;
    use crate::store::{Fault, InMemoryStore, RawDocument, StoreOp};

    fn doc(value: Value) -> RawDocument {
        match value {
            Value::Object(map) => RawDocument::new(map),
            _ => RawDocument::default(),
        }
    }

    fn cart_doc(id: &str, meal: &str, owner: &str) -> RawDocument {
        doc(json!({
            "$id": id,
            "mealId": meal,
            "user": owner,
            "name": "Pho",
            "price": 12.5,
            "image": "pho.png",
        }))
    }

    async fn setup() -> (InMemoryStore, Gateways) {
        let store = InMemoryStore::new();
        let gateways = Gateways::new(Arc::new(store.clone()), CollectionIds::default());
        (store, gateways)
    }

    #[tokio::test]
    async fn test_list_excludes_malformed_documents() {
        let (store, gateways) = setup().await;
        store.seed("cart", cart_doc("c1", "m1", "ann@example.com")).await;
        store
            .seed("cart", doc(json!({"$id": "c2", "user": "ann@example.com"})))
            .await;

        let listing = gateways.of::<CartItem>().list(&Filter::all()).await.unwrap();
        assert_eq!(listing.records.len(), 1);
        assert_eq!(listing.rejected.len(), 1);
        assert!(matches!(
            &listing.rejected[0],
            SyncError::MalformedRecord { collection: Collection::Cart, id: Some(id), .. } if id == "c2"
        ));
    }

    #[tokio::test]
    async fn test_list_owned_scopes_to_owner() {
        let (store, gateways) = setup().await;
        store.seed("cart", cart_doc("c1", "m1", "ann@example.com")).await;
        store.seed("cart", cart_doc("c2", "m1", "bob@example.com")).await;

        let ann = OwnerId::new("ann@example.com");
        let listing = gateways.of::<CartItem>().list_owned(&ann).await.unwrap();
        assert_eq!(listing.records.len(), 1);
        assert!(listing.records.iter().all(|item| item.owner_id == ann));
    }

    #[tokio::test]
    async fn test_get_owned_hides_other_owners() {
        let (store, gateways) = setup().await;
        store.seed("cart", cart_doc("c1", "m1", "bob@example.com")).await;

        let err = gateways
            .of::<CartItem>()
            .get_owned("c1", &OwnerId::new("ann@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_memberships_filter_by_meal_and_owner() {
        let (store, gateways) = setup().await;
        store.seed("cart", cart_doc("c1", "m1", "ann@example.com")).await;
        store.seed("cart", cart_doc("c2", "m2", "ann@example.com")).await;

        let found = gateways
            .of::<CartItem>()
            .memberships(&OwnerId::new("ann@example.com"), &MealId::new("m2"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "c2");
    }

    #[tokio::test]
    async fn test_store_errors_are_converted() {
        let (store, gateways) = setup().await;
        store.inject(Fault::on(StoreOp::List, "orders"));

        let err = gateways
            .of::<mealcart_core::OrderItem>()
            .list(&Filter::all())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StoreUnavailable);

        let err = gateways.of::<CartItem>().remove("missing").await.unwrap_err();
        assert_eq!(
            err,
            SyncError::NotFound {
                collection: Collection::Cart,
                id: "missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_create_meal_assigns_fresh_id() {
        let (_store, gateways) = setup().await;
        let meal = gateways
            .of::<MealRecord>()
            .create_meal(&NewMeal {
                name: "Laksa".to_string(),
                price: Price::from_cents(1400),
                image: "laksa.png".to_string(),
                category: Some("soup".to_string()),
                description: None,
            })
            .await
            .unwrap();
        assert!(!meal.id.as_str().is_empty());
        assert_eq!(meal.category.as_deref(), Some("soup"));
    }

    #[test]
    fn test_sort_newest() {
        let now = Utc::now();
        let meal = |id: &str, age: i64| MealRecord {
            id: MealId::new(id),
            created_at: now - Duration::minutes(age),
            name: id.to_string(),
            price: Price::ZERO,
            image: String::new(),
            category: None,
            description: None,
        };
        let mut meals = vec![meal("old", 30), meal("new", 1), meal("mid", 10)];
        sort_newest(&mut meals);
        let ids: Vec<_> = meals.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }
}
