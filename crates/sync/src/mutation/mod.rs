//! Optimistic mutation engine.
//!
//! Membership mutations flip the local [`SharedIndex`] before the remote call
//! resolves and settle it afterwards: the optimistic value stands on success
//! and the previous value is restored on failure. Each mutation walks its own
//! [`MutationState`]; the index only ever shows [`MutationState::membership`].
//!
//! Concurrent toggles on the same meal are not serialized. Favorite and cart
//! documents carry a deterministic id per owner and meal, so two racing adds
//! collide as `Conflict` and the loser counts as already satisfied.

mod state;

pub use state::MutationState;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use mealcart_core::{MealId, MealRecord, MembershipKind, OwnerId};

use crate::cache::{Cacheable, QueryCache};
use crate::error::{Result, SyncError};
use crate::gateway::Gateways;
use crate::mapper::MembershipRecord;
use crate::membership::SharedIndex;

/// What a committed mutation did remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationEffect {
    /// A new favorite or cart document was created.
    Added,
    /// A matching document already existed; nothing was created.
    AlreadyPresent,
    /// The matching document was deleted.
    Removed,
}

/// Result of a committed membership mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub kind: MembershipKind,
    pub meal_id: MealId,
    pub effect: MutationEffect,
    /// Final state, always `Committed`.
    pub state: MutationState,
}

impl MutationOutcome {
    /// Membership after the mutation.
    #[must_use]
    pub const fn is_member(&self) -> bool {
        matches!(self.effect, MutationEffect::Added | MutationEffect::AlreadyPresent)
    }
}

/// Runs favorite and cart mutations against the gateways.
#[derive(Clone)]
pub struct MutationEngine {
    gateways: Gateways,
    cache: QueryCache,
    favorites: SharedIndex,
    cart: SharedIndex,
}

impl MutationEngine {
    /// Engine over `gateways`, invalidating `cache` and driving both indexes.
    #[must_use]
    pub const fn new(
        gateways: Gateways,
        cache: QueryCache,
        favorites: SharedIndex,
        cart: SharedIndex,
    ) -> Self {
        Self {
            gateways,
            cache,
            favorites,
            cart,
        }
    }

    /// The index tracking `kind`.
    #[must_use]
    pub const fn index(&self, kind: MembershipKind) -> &SharedIndex {
        match kind {
            MembershipKind::Favorites => &self.favorites,
            MembershipKind::Cart => &self.cart,
        }
    }

    /// Toggle `owner`'s membership of `meal_id` in `R`'s collection.
    ///
    /// # Errors
    ///
    /// Returns the error that rolled the mutation back: `SourceNotFound` when
    /// adding a meal that no longer exists, `NotFound` when removing a
    /// membership that is already gone, and `StoreUnavailable` on transport
    /// failure. The index shows its pre-toggle value afterwards.
    #[instrument(skip(self), fields(kind = ?R::KIND))]
    pub async fn toggle<R>(&self, owner: &OwnerId, meal_id: &MealId) -> Result<MutationOutcome>
    where
        R: MembershipRecord + Cacheable,
    {
        let index = self.index(R::KIND);
        let was_present = index.get(meal_id);
        let state = MutationState::Idle.begin(was_present, !was_present);
        index.apply(meal_id, &state);
        debug!(was_present, "Applied optimistic toggle");

        let result = if was_present {
            self.remove_memberships::<R>(owner, meal_id).await
        } else {
            self.add_membership::<R>(owner, meal_id).await
        };

        let state = state.settle(&result);
        if result.is_ok() {
            // Before the index settles, so an in-flight list cannot rebuild over it.
            self.cache.mark_stale(R::QUERY, Some(owner));
        }
        index.apply(meal_id, &state);

        match result {
            Ok(effect) => {
                info!(?effect, "Toggle committed");
                Ok(MutationOutcome {
                    kind: R::KIND,
                    meal_id: meal_id.clone(),
                    effect,
                    state,
                })
            }
            Err(err) => {
                warn!(error = %err, restored = was_present, "Toggle rolled back");
                Err(err)
            }
        }
    }

    /// Remove one of `owner`'s favorite or cart documents by id.
    ///
    /// The item is read first; its meal's index entry goes optimistically to
    /// `false` and is restored to `true` if the delete fails.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the item does not exist or belongs to someone
    /// else (the index is untouched), or `StoreUnavailable` if the read or
    /// the delete fails.
    #[instrument(skip(self), fields(kind = ?R::KIND))]
    pub async fn remove<R>(&self, owner: &OwnerId, id: &str) -> Result<MutationOutcome>
    where
        R: MembershipRecord + Cacheable,
    {
        let gateway = self.gateways.of::<R>();
        let item = gateway.get_owned(id, owner).await?;
        let meal_id = item.meal_id().clone();

        let index = self.index(R::KIND);
        let state = MutationState::Idle.begin(true, false);
        index.apply(&meal_id, &state);
        debug!(meal_id = %meal_id, "Applied optimistic removal");

        let result = gateway.remove(id).await;
        let state = state.settle(&result);
        if result.is_ok() {
            self.cache.mark_stale(R::QUERY, Some(owner));
        }
        index.apply(&meal_id, &state);

        match result {
            Ok(()) => {
                info!(meal_id = %meal_id, "Removal committed");
                Ok(MutationOutcome {
                    kind: R::KIND,
                    meal_id,
                    effect: MutationEffect::Removed,
                    state,
                })
            }
            Err(err) => {
                warn!(error = %err, meal_id = %meal_id, "Removal rolled back");
                Err(err)
            }
        }
    }

    async fn add_membership<R: MembershipRecord>(
        &self,
        owner: &OwnerId,
        meal_id: &MealId,
    ) -> Result<MutationEffect> {
        let gateway = self.gateways.of::<R>();
        if !gateway.memberships(owner, meal_id).await?.is_empty() {
            debug!("Membership already exists");
            return Ok(MutationEffect::AlreadyPresent);
        }

        let meal = match self.gateways.of::<MealRecord>().get(meal_id.as_str()).await {
            Ok(meal) => meal,
            Err(SyncError::NotFound { .. }) => {
                return Err(SyncError::SourceNotFound(meal_id.clone()));
            }
            Err(err) => return Err(err),
        };

        let id = R::membership_id(owner, meal_id);
        match gateway.create(&id, R::draft(&meal, owner)).await {
            Ok(_) => Ok(MutationEffect::Added),
            Err(SyncError::Conflict { .. }) => {
                debug!(id, "Concurrent create won, treating as present");
                Ok(MutationEffect::AlreadyPresent)
            }
            Err(err) => Err(err),
        }
    }

    async fn remove_memberships<R: MembershipRecord>(
        &self,
        owner: &OwnerId,
        meal_id: &MealId,
    ) -> Result<MutationEffect> {
        let gateway = self.gateways.of::<R>();
        let existing = gateway.memberships(owner, meal_id).await?;
        if existing.is_empty() {
            return Err(SyncError::NotFound {
                collection: R::COLLECTION,
                id: meal_id.to_string(),
            });
        }

        // Sequential so a failure stops before touching the rest.
        for record in &existing {
            gateway.remove(record.document_id()).await?;
        }
        Ok(MutationEffect::Removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mealcart_core::{CartItem, FavoriteItem, QueryKey};
    use serde_json::{Value, json};

    use super::*;
    use crate::config::{CacheConfig, CollectionIds};
    use crate::error::ErrorKind;
    use crate::gateway::Listing;
    use crate::store::{Fault, InMemoryStore, RawDocument, StoreOp};

    fn doc(value: Value) -> RawDocument {
        match value {
            Value::Object(map) => RawDocument::new(map),
            _ => RawDocument::default(),
        }
    }

    fn ann() -> OwnerId {
        OwnerId::new("ann@example.com")
    }

    async fn setup() -> (InMemoryStore, MutationEngine) {
        let store = InMemoryStore::new();
        store
            .seed(
                "meals",
                doc(json!({"$id": "m1", "name": "Pho", "price": 12.5, "image": "pho.png"})),
            )
            .await;
        let engine = MutationEngine::new(
            Gateways::new(Arc::new(store.clone()), CollectionIds::default()),
            QueryCache::new(&CacheConfig::default()),
            SharedIndex::new(),
            SharedIndex::new(),
        );
        (store, engine)
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (store, engine) = setup().await;
        let meal = MealId::new("m1");

        let added = engine.toggle::<FavoriteItem>(&ann(), &meal).await.unwrap();
        assert_eq!(added.effect, MutationEffect::Added);
        assert_eq!(added.state, MutationState::Committed { value: true });
        assert!(engine.index(MembershipKind::Favorites).get(&meal));
        assert_eq!(store.documents("favorites").await.len(), 1);

        let removed = engine.toggle::<FavoriteItem>(&ann(), &meal).await.unwrap();
        assert_eq!(removed.effect, MutationEffect::Removed);
        assert!(!engine.index(MembershipKind::Favorites).get(&meal));
        assert!(store.documents("favorites").await.is_empty());
    }

    #[tokio::test]
    async fn test_existing_membership_is_not_duplicated() {
        let (store, engine) = setup().await;
        let meal = MealId::new("m1");
        let id = CartItem::membership_id(&ann(), &meal);
        store
            .seed(
                "cart",
                doc(json!({
                    "$id": id, "mealId": "m1", "user": "ann@example.com",
                    "name": "Pho", "price": 12.5, "image": "pho.png",
                })),
            )
            .await;

        let outcome = engine.toggle::<CartItem>(&ann(), &meal).await.unwrap();
        assert_eq!(outcome.effect, MutationEffect::AlreadyPresent);
        assert!(outcome.is_member());
        assert_eq!(store.documents("cart").await.len(), 1);
        assert_eq!(store.calls(StoreOp::Create, "cart"), 0);
    }

    #[tokio::test]
    async fn test_missing_source_meal_rolls_back() {
        let (_store, engine) = setup().await;
        let meal = MealId::new("gone");

        let err = engine.toggle::<CartItem>(&ann(), &meal).await.unwrap_err();
        assert_eq!(err, SyncError::SourceNotFound(meal.clone()));
        assert!(!engine.index(MembershipKind::Cart).get(&meal));
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back() {
        let (store, engine) = setup().await;
        store.inject(Fault::on(StoreOp::Create, "favorites"));
        let meal = MealId::new("m1");

        let err = engine.toggle::<FavoriteItem>(&ann(), &meal).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(!engine.index(MembershipKind::Favorites).get(&meal));
    }

    #[tokio::test]
    async fn test_removing_absent_membership_restores_true() {
        let (_store, engine) = setup().await;
        let meal = MealId::new("m1");
        engine.index(MembershipKind::Cart).set(meal.clone(), true);

        let err = engine.toggle::<CartItem>(&ann(), &meal).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(engine.index(MembershipKind::Cart).get(&meal));
    }

    #[tokio::test]
    async fn test_optimistic_value_visible_while_pending() {
        let (store, engine) = setup().await;
        store.set_latency(Some(Duration::from_millis(50)));
        let meal = MealId::new("m1");

        let task = tokio::spawn({
            let engine = engine.clone();
            let meal = meal.clone();
            async move { engine.toggle::<FavoriteItem>(&ann(), &meal).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(engine.index(MembershipKind::Favorites).get(&meal));

        task.await.unwrap().unwrap();
        assert!(engine.index(MembershipKind::Favorites).get(&meal));
    }

    #[tokio::test]
    async fn test_remove_by_id_twice() {
        let (store, engine) = setup().await;
        let meal = MealId::new("m1");
        engine.toggle::<FavoriteItem>(&ann(), &meal).await.unwrap();
        let id = store.documents("favorites").await[0]
            .id()
            .unwrap()
            .to_owned();

        let first = engine.remove::<FavoriteItem>(&ann(), &id).await.unwrap();
        assert_eq!(first.state, MutationState::Committed { value: false });
        let snapshot = engine.index(MembershipKind::Favorites).snapshot();

        let err = engine.remove::<FavoriteItem>(&ann(), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(engine.index(MembershipKind::Favorites).snapshot(), snapshot);
    }

    #[tokio::test]
    async fn test_failed_remove_restores_true() {
        let (store, engine) = setup().await;
        let meal = MealId::new("m1");
        engine.toggle::<CartItem>(&ann(), &meal).await.unwrap();
        let id = CartItem::membership_id(&ann(), &meal);
        store.inject(Fault::on(StoreOp::Delete, "cart"));

        let err = engine.remove::<CartItem>(&ann(), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(engine.index(MembershipKind::Cart).get(&meal));
    }

    #[tokio::test]
    async fn test_commit_marks_list_stale() {
        let (_store, engine) = setup().await;
        engine
            .cache
            .store::<CartItem>(Some(&ann()), Listing::default())
            .await;
        assert!(!engine.cache.is_stale(QueryKey::CartList, Some(&ann())).await);

        engine
            .toggle::<CartItem>(&ann(), &MealId::new("m1"))
            .await
            .unwrap();
        assert!(engine.cache.is_stale(QueryKey::CartList, Some(&ann())).await);
    }
}
