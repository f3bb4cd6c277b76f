//! The facade exposed to UI callers.
//!
//! [`Storefront`] owns the query cache, both membership indexes, the
//! mutation engine and the transfer orchestrator, and resolves the current
//! user once per operation. It is cheaply cloneable via `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{info, instrument};

use mealcart_core::{
    CartItem, CartItemId, FavoriteId, FavoriteItem, MealId, MealRecord, NewMeal, OrderItem,
    OwnerId, Price, QueryKey,
};

use crate::cache::{Cacheable, QueryCache, Snapshot};
use crate::config::{CacheConfig, CollectionIds, SyncConfig};
use crate::error::{Result, SyncError};
use crate::gateway::{self, Gateways};
use crate::identity::{CurrentUser, Identity};
use crate::mapper::MembershipRecord;
use crate::membership::SharedIndex;
use crate::mutation::{MutationEngine, MutationOutcome};
use crate::store::{DocumentStore, Filter, HttpDocumentStore};
use crate::transfer::{TransferOrchestrator, TransferReport};

/// Groups of operations whose last error is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MutationFamily {
    Favorites,
    Cart,
    Transfer,
    Catalog,
}

/// Size and value of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotal {
    pub items: usize,
    pub total: Price,
}

/// Synchronization layer entry point.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    identity: Arc<dyn Identity>,
    gateways: Gateways,
    cache: QueryCache,
    engine: MutationEngine,
    transfer: TransferOrchestrator,
    last_errors: Mutex<HashMap<MutationFamily, String>>,
}

impl Storefront {
    /// Create a storefront over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn Identity>,
        collections: CollectionIds,
        cache: &CacheConfig,
    ) -> Self {
        let gateways = Gateways::new(store, collections);
        let cache = QueryCache::new(cache);
        let favorites = SharedIndex::new();
        let cart = SharedIndex::new();
        let engine = MutationEngine::new(gateways.clone(), cache.clone(), favorites, cart.clone());
        let transfer = TransferOrchestrator::new(gateways.clone(), cache.clone(), cart);

        Self {
            inner: Arc::new(StorefrontInner {
                identity,
                gateways,
                cache,
                engine,
                transfer,
                last_errors: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a storefront against the remote document store in `config`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig, identity: Arc<dyn Identity>) -> Result<Self> {
        let store = HttpDocumentStore::new(&config.store)
            .map_err(|e| SyncError::StoreUnavailable(e.to_string()))?;
        Ok(Self::new(
            Arc::new(store),
            identity,
            config.collections.clone(),
            &config.cache,
        ))
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Unauthenticated` when nobody is signed in.
    pub async fn current_user(&self) -> Result<CurrentUser> {
        self.inner.identity.current_user().await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Favorite `meal_id`, or unfavorite it if it already is.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::toggle`]; also `Unauthenticated`.
    #[instrument(skip(self), fields(meal_id = %meal_id))]
    pub async fn toggle_favorite(&self, meal_id: &MealId) -> Result<MutationOutcome> {
        self.attempt(MutationFamily::Favorites, async {
            let user = self.current_user().await?;
            self.inner
                .engine
                .toggle::<FavoriteItem>(&user.id, meal_id)
                .await
        })
        .await
    }

    /// Add `meal_id` to the cart, or take it out if it is already there.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::toggle`]; also `Unauthenticated`.
    #[instrument(skip(self), fields(meal_id = %meal_id))]
    pub async fn toggle_cart(&self, meal_id: &MealId) -> Result<MutationOutcome> {
        self.attempt(MutationFamily::Cart, async {
            let user = self.current_user().await?;
            self.inner.engine.toggle::<CartItem>(&user.id, meal_id).await
        })
        .await
    }

    /// Delete one favorite by id.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::remove`]; also `Unauthenticated`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn remove_favorite(&self, id: &FavoriteId) -> Result<MutationOutcome> {
        self.attempt(MutationFamily::Favorites, async {
            let user = self.current_user().await?;
            self.inner
                .engine
                .remove::<FavoriteItem>(&user.id, id.as_str())
                .await
        })
        .await
    }

    /// Delete one cart item by id.
    ///
    /// # Errors
    ///
    /// See [`MutationEngine::remove`]; also `Unauthenticated`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn remove_from_cart(&self, id: &CartItemId) -> Result<MutationOutcome> {
        self.attempt(MutationFamily::Cart, async {
            let user = self.current_user().await?;
            self.inner
                .engine
                .remove::<CartItem>(&user.id, id.as_str())
                .await
        })
        .await
    }

    /// Turn the current user's cart into orders.
    ///
    /// A partial transfer is not an error; inspect the report. Its failures
    /// are still remembered as the transfer family's last error.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCart`, `StoreUnavailable` (cart listing failed) or
    /// `Unauthenticated`.
    #[instrument(skip(self))]
    pub async fn transfer_cart_to_orders(&self) -> Result<TransferReport> {
        let report = self
            .attempt(MutationFamily::Transfer, async {
                let user = self.current_user().await?;
                self.inner.transfer.transfer(&user.id).await
            })
            .await?;
        if let Some(summary) = report.failure_summary() {
            self.remember_error(MutationFamily::Transfer, summary);
        }
        Ok(report)
    }

    /// Add a meal to the catalog.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` on transport failure.
    #[instrument(skip(self, meal), fields(name = %meal.name))]
    pub async fn create_meal(&self, meal: &NewMeal) -> Result<MealRecord> {
        self.attempt(MutationFamily::Catalog, async {
            let created = self.inner.gateways.of::<MealRecord>().create_meal(meal).await?;
            self.inner.cache.mark_stale(QueryKey::MealsList, None);
            info!(meal_id = %created.id, "Meal created");
            Ok::<_, SyncError>(created)
        })
        .await
    }

    /// Remove a meal from the catalog.
    ///
    /// Favorites and cart items copied from it keep their own fields.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if the meal does not exist, or
    /// `SyncError::StoreUnavailable` on transport failure.
    #[instrument(skip(self), fields(meal_id = %meal_id))]
    pub async fn delete_meal(&self, meal_id: &MealId) -> Result<()> {
        self.attempt(MutationFamily::Catalog, async {
            self.inner
                .gateways
                .of::<MealRecord>()
                .remove(meal_id.as_str())
                .await?;
            self.inner.cache.mark_stale(QueryKey::MealsList, None);
            info!("Meal deleted");
            Ok::<_, SyncError>(())
        })
        .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The catalog.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if nothing is cached and the
    /// fetch fails.
    #[instrument(skip(self))]
    pub async fn meals(&self) -> Result<Snapshot<MealRecord>> {
        let gateway = self.inner.gateways.of::<MealRecord>();
        self.inner
            .cache
            .read_through(None, || async move { gateway.list(&Filter::all()).await })
            .await
    }

    /// The catalog, newest first.
    ///
    /// # Errors
    ///
    /// See [`Storefront::meals`].
    pub async fn newest_meals(&self) -> Result<Vec<MealRecord>> {
        let mut meals = self.meals().await?.items.to_vec();
        gateway::sort_newest(&mut meals);
        Ok(meals)
    }

    /// `owner`'s favorites.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if nothing is cached and the
    /// fetch fails.
    #[instrument(skip(self))]
    pub async fn favorites_of(&self, owner: &OwnerId) -> Result<Snapshot<FavoriteItem>> {
        self.read_memberships(owner).await
    }

    /// `owner`'s cart.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if nothing is cached and the
    /// fetch fails.
    #[instrument(skip(self))]
    pub async fn cart_of(&self, owner: &OwnerId) -> Result<Snapshot<CartItem>> {
        self.read_memberships(owner).await
    }

    /// `owner`'s orders.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::StoreUnavailable` if nothing is cached and the
    /// fetch fails.
    #[instrument(skip(self))]
    pub async fn orders_of(&self, owner: &OwnerId) -> Result<Snapshot<OrderItem>> {
        let gateway = self.inner.gateways.of::<OrderItem>();
        self.inner
            .cache
            .read_through(Some(owner), || async move { gateway.list_owned(owner).await })
            .await
    }

    /// Item count and total price of the current user's cart.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated`, or the errors of [`Storefront::cart_of`].
    pub async fn cart_total(&self) -> Result<CartTotal> {
        let user = self.current_user().await?;
        let cart = self.cart_of(&user.id).await?;
        Ok(CartTotal {
            items: cart.len(),
            total: cart.items.iter().map(|item| item.price).sum(),
        })
    }

    /// Whether the current session has `meal_id` favorited.
    #[must_use]
    pub fn is_favorite(&self, meal_id: &MealId) -> bool {
        self.index_of::<FavoriteItem>().get(meal_id)
    }

    /// Whether the current session has `meal_id` in the cart.
    #[must_use]
    pub fn is_in_cart(&self, meal_id: &MealId) -> bool {
        self.index_of::<CartItem>().get(meal_id)
    }

    /// Refetch the current user's favorites and cart and rebuild both indexes.
    ///
    /// # Errors
    ///
    /// Returns `Unauthenticated`, or `StoreUnavailable` if either list fails.
    #[instrument(skip(self))]
    pub async fn refresh_memberships(&self) -> Result<()> {
        let user = self.current_user().await?;
        let owner = Some(&user.id);
        let cache = &self.inner.cache;
        let started = (
            cache.generation(FavoriteItem::QUERY, owner),
            cache.generation(CartItem::QUERY, owner),
        );
        let favorites = self.inner.gateways.of::<FavoriteItem>();
        let cart = self.inner.gateways.of::<CartItem>();
        let (favorites, cart) =
            futures::try_join!(favorites.list_owned(&user.id), cart.list_owned(&user.id))?;
        info!(
            favorites = favorites.records.len(),
            cart = cart.records.len(),
            "Memberships refreshed"
        );

        let favorites_index = self.index_of::<FavoriteItem>();
        cache
            .store_fetched(owner, favorites, started.0, |records| {
                favorites_index.rebuild(records.iter().map(FavoriteItem::meal_id));
            })
            .await;
        let cart_index = self.index_of::<CartItem>();
        cache
            .store_fetched(owner, cart, started.1, |records| {
                cart_index.rebuild(records.iter().map(CartItem::meal_id));
            })
            .await;
        Ok(())
    }

    /// Forget every snapshot and membership, e.g. after the user changes.
    pub async fn reset(&self) {
        self.inner.cache.clear().await;
        self.index_of::<FavoriteItem>().rebuild(std::iter::empty());
        self.index_of::<CartItem>().rebuild(std::iter::empty());
        self.last_errors().clear();
    }

    /// The last error of `family`, until its next attempt starts.
    #[must_use]
    pub fn last_error(&self, family: MutationFamily) -> Option<String> {
        self.last_errors().get(&family).cloned()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn index_of<R: MembershipRecord>(&self) -> &SharedIndex {
        self.inner.engine.index(R::KIND)
    }

    fn last_errors(&self) -> MutexGuard<'_, HashMap<MutationFamily, String>> {
        self.inner
            .last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remember_error(&self, family: MutationFamily, message: String) {
        self.last_errors().insert(family, message);
    }

    /// Run one attempt of `family`, replacing its last error with the outcome.
    async fn attempt<T>(
        &self,
        family: MutationFamily,
        operation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.last_errors().remove(&family);
        let result = operation.await;
        if let Err(err) = &result {
            self.remember_error(family, err.to_string());
        }
        result
    }

    /// Read a favorites or cart list, rebuilding the session's index when
    /// the list was refetched for the signed-in user and no mutation of it
    /// committed during the fetch.
    async fn read_memberships<R>(&self, owner: &OwnerId) -> Result<Snapshot<R>>
    where
        R: MembershipRecord + Cacheable,
    {
        let gateway = self.inner.gateways.of::<R>();
        let index = self.index_of::<R>();
        let is_session_owner = self
            .current_user()
            .await
            .is_ok_and(|user| &user.id == owner);

        self.inner
            .cache
            .read_through_with(
                Some(owner),
                || async move { gateway.list_owned(owner).await },
                |records: &[R]| {
                    if is_session_owner {
                        index.rebuild(records.iter().map(R::meal_id));
                    }
                },
            )
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mealcart_core::Email;
    use serde_json::{Value, json};

    use super::*;
    use crate::identity::StaticIdentity;
    use crate::store::{InMemoryStore, RawDocument};

    fn doc(value: Value) -> RawDocument {
        match value {
            Value::Object(map) => RawDocument::new(map),
            _ => RawDocument::default(),
        }
    }

    async fn setup(identity: StaticIdentity) -> (InMemoryStore, Storefront) {
        let store = InMemoryStore::new();
        store
            .seed(
                "meals",
                doc(json!({"$id": "m1", "name": "Pho", "price": 12.5, "image": "pho.png"})),
            )
            .await;
        let storefront = Storefront::new(
            Arc::new(store.clone()),
            Arc::new(identity),
            CollectionIds::default(),
            &CacheConfig::default(),
        );
        (store, storefront)
    }

    fn ann() -> StaticIdentity {
        StaticIdentity::signed_in(Email::parse("ann@example.com").unwrap())
    }

    #[tokio::test]
    async fn test_unauthenticated_mutation_is_remembered() {
        let (_store, storefront) = setup(StaticIdentity::new()).await;
        let err = storefront
            .toggle_favorite(&MealId::new("m1"))
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::Unauthenticated);
        assert_eq!(
            storefront.last_error(MutationFamily::Favorites).as_deref(),
            Some("Not signed in")
        );
        assert!(storefront.last_error(MutationFamily::Cart).is_none());
    }

    #[tokio::test]
    async fn test_last_error_cleared_by_next_attempt() {
        let (_store, storefront) = setup(ann()).await;
        storefront.toggle_cart(&MealId::new("gone")).await.unwrap_err();
        assert!(storefront.last_error(MutationFamily::Cart).is_some());

        storefront.toggle_cart(&MealId::new("m1")).await.unwrap();
        assert!(storefront.last_error(MutationFamily::Cart).is_none());
    }

    #[tokio::test]
    async fn test_cart_total_sums_prices() {
        let (_store, storefront) = setup(ann()).await;
        storefront.toggle_cart(&MealId::new("m1")).await.unwrap();

        let total = storefront.cart_total().await.unwrap();
        assert_eq!(total.items, 1);
        assert_eq!(total.total, Price::from_cents(1250));
    }

    #[tokio::test]
    async fn test_refresh_memberships_rebuilds_indexes() {
        let (store, storefront) = setup(ann()).await;
        store
            .seed(
                "favorites",
                doc(json!({
                    "$id": "f1", "mealId": "m1", "user": "ann@example.com",
                    "name": "Pho", "price": 12.5, "image": "pho.png",
                })),
            )
            .await;
        assert!(!storefront.is_favorite(&MealId::new("m1")));

        storefront.refresh_memberships().await.unwrap();
        assert!(storefront.is_favorite(&MealId::new("m1")));
        assert!(!storefront.is_in_cart(&MealId::new("m1")));
    }

    #[tokio::test]
    async fn test_catalog_mutations_invalidate_meals() {
        let (_store, storefront) = setup(ann()).await;
        assert_eq!(storefront.meals().await.unwrap().len(), 1);

        let created = storefront
            .create_meal(&NewMeal {
                name: "Laksa".to_string(),
                price: Price::from_cents(1400),
                image: "laksa.png".to_string(),
                category: None,
                description: None,
            })
            .await
            .unwrap();
        assert_eq!(storefront.meals().await.unwrap().len(), 2);

        storefront.delete_meal(&created.id).await.unwrap();
        assert_eq!(storefront.meals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_session_state() {
        let (_store, storefront) = setup(ann()).await;
        storefront.toggle_favorite(&MealId::new("m1")).await.unwrap();
        assert!(storefront.is_favorite(&MealId::new("m1")));

        storefront.reset().await;
        assert!(!storefront.is_favorite(&MealId::new("m1")));
    }
}
