//! Query cache with staleness tracking.
//!
//! Each list query (meals, favorites, cart, orders) keeps its last fetched
//! snapshot in a `moka` cache keyed by query and owner. Mutations mark the
//! queries they affect as stale; the next read of a stale query refetches
//! before returning. Fresh reads never touch the network.
//!
//! Staleness is tracked with a generation counter per key rather than a flag
//! on the entry. Marking a query stale bumps its generation whether or not a
//! snapshot exists, and a snapshot is fresh only while its generation is
//! current. A fetch that was already in flight when the query was marked
//! therefore lands as stale, and does not get to rebuild derived state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::{debug, warn};

use mealcart_core::{CartItem, FavoriteItem, MealRecord, OrderItem, OwnerId, QueryKey};

use crate::config::CacheConfig;
use crate::error::{Result, SyncError};
use crate::gateway::Listing;
use crate::mapper::StoredRecord;

/// Cache key: a query, scoped to an owner unless it is the shared catalog.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    query: QueryKey,
    owner: Option<OwnerId>,
}

impl CacheKey {
    fn new(query: QueryKey, owner: Option<&OwnerId>) -> Self {
        Self {
            query,
            owner: owner.filter(|_| query.is_owner_scoped()).cloned(),
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Meals(Arc<Vec<MealRecord>>),
    Favorites(Arc<Vec<FavoriteItem>>),
    Cart(Arc<Vec<CartItem>>),
    Orders(Arc<Vec<OrderItem>>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    /// Generation of the key when the fetch started.
    generation: u64,
    fetched_at: DateTime<Utc>,
    rejected: usize,
}

/// Invalidation counters. `epoch` moves every key at once.
#[derive(Debug, Default)]
struct Generations {
    epoch: u64,
    per_key: HashMap<CacheKey, u64>,
}

impl Generations {
    fn current(&self, key: &CacheKey) -> u64 {
        self.epoch + self.per_key.get(key).copied().unwrap_or_default()
    }
}

/// A record type whose list query is cached.
pub trait Cacheable: StoredRecord {
    /// The list query over this record's collection.
    const QUERY: QueryKey = Self::COLLECTION.list_query();

    fn wrap(items: Arc<Vec<Self>>) -> CacheValue;

    fn unwrap(value: &CacheValue) -> Option<Arc<Vec<Self>>>;
}

macro_rules! cacheable {
    ($record:ty, $variant:ident) => {
        impl Cacheable for $record {
            fn wrap(items: Arc<Vec<Self>>) -> CacheValue {
                CacheValue::$variant(items)
            }

            fn unwrap(value: &CacheValue) -> Option<Arc<Vec<Self>>> {
                match value {
                    CacheValue::$variant(items) => Some(Arc::clone(items)),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(MealRecord, Meals);
cacheable!(FavoriteItem, Favorites);
cacheable!(CartItem, Cart);
cacheable!(OrderItem, Orders);

/// The result of a cached read.
#[derive(Debug, Clone)]
pub struct Snapshot<R> {
    /// Records as of `fetched_at`.
    pub items: Arc<Vec<R>>,
    /// True when a mutation has invalidated these records.
    pub stale: bool,
    /// When the records were fetched.
    pub fetched_at: DateTime<Utc>,
    /// Documents dropped by the mapper during that fetch.
    pub rejected: usize,
    /// Why the refetch of a stale snapshot failed, if it did.
    pub refresh_error: Option<SyncError>,
}

impl<R> Snapshot<R> {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Snapshot cache shared by the facade, the engine and the orchestrator.
///
/// Cheap to clone; clones share entries and generations.
#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<CacheKey, CacheEntry>,
    generations: Arc<Mutex<Generations>>,
}

impl QueryCache {
    /// Create a cache with the configured capacity and time-to-live.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(config.ttl)
            .build();
        Self {
            entries,
            generations: Arc::new(Mutex::new(Generations::default())),
        }
    }

    fn generations(&self) -> MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation of `query`. A fetch started now is fresh until it changes.
    #[must_use]
    pub fn generation(&self, query: QueryKey, owner: Option<&OwnerId>) -> u64 {
        self.generations().current(&CacheKey::new(query, owner))
    }

    /// The cached snapshot, without fetching.
    pub async fn peek<R: Cacheable>(&self, owner: Option<&OwnerId>) -> Option<Snapshot<R>> {
        let key = CacheKey::new(R::QUERY, owner);
        let entry = self.entries.get(&key).await?;
        let items = R::unwrap(&entry.value)?;
        let current = self.generations().current(&key);
        Some(Snapshot {
            items,
            stale: entry.generation != current,
            fetched_at: entry.fetched_at,
            rejected: entry.rejected,
            refresh_error: None,
        })
    }

    /// Store a listing fetched just now and return it as a snapshot.
    pub async fn store<R: Cacheable>(
        &self,
        owner: Option<&OwnerId>,
        listing: Listing<R>,
    ) -> Snapshot<R> {
        let started = self.generation(R::QUERY, owner);
        self.store_fetched(owner, listing, started, |_| ()).await
    }

    /// Store a listing whose fetch started at generation `started`.
    ///
    /// If the query was marked stale since then, the listing is stored stale
    /// and `on_current` is skipped. Otherwise `on_current` runs before any
    /// later [`mark_stale`](Self::mark_stale) can complete.
    pub async fn store_fetched<R, A>(
        &self,
        owner: Option<&OwnerId>,
        listing: Listing<R>,
        started: u64,
        on_current: A,
    ) -> Snapshot<R>
    where
        R: Cacheable,
        A: FnOnce(&[R]),
    {
        let key = CacheKey::new(R::QUERY, owner);
        let current = {
            let generations = self.generations();
            let current = generations.current(&key) == started;
            if current {
                on_current(&listing.records);
            }
            current
        };
        if !current {
            debug!(query = %R::QUERY, "Invalidated during fetch, storing as stale");
        }

        let items = Arc::new(listing.records);
        let entry = CacheEntry {
            value: R::wrap(Arc::clone(&items)),
            generation: started,
            fetched_at: Utc::now(),
            rejected: listing.rejected.len(),
        };
        let snapshot = Snapshot {
            items,
            stale: !current,
            fetched_at: entry.fetched_at,
            rejected: entry.rejected,
            refresh_error: None,
        };
        self.entries.insert(key, entry).await;
        snapshot
    }

    /// Mark a query stale so the next read refetches it.
    ///
    /// Also invalidates any fetch of the query still in flight.
    pub fn mark_stale(&self, query: QueryKey, owner: Option<&OwnerId>) {
        let key = CacheKey::new(query, owner);
        *self.generations().per_key.entry(key).or_default() += 1;
        debug!(%query, "Marked query stale");
    }

    /// Whether the next read of `query` would fetch. Missing entries count as stale.
    pub async fn is_stale(&self, query: QueryKey, owner: Option<&OwnerId>) -> bool {
        let key = CacheKey::new(query, owner);
        match self.entries.get(&key).await {
            Some(entry) => entry.generation != self.generations().current(&key),
            None => true,
        }
    }

    /// Drop every snapshot, e.g. on sign-out. Fetches in flight land stale.
    pub async fn clear(&self) {
        self.generations().epoch += 1;
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    /// Serve a fresh snapshot, or refetch through `fetch`.
    ///
    /// If the refetch of a stale snapshot fails, the old snapshot is returned
    /// still flagged stale, with the failure in `refresh_error`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when nothing was cached.
    pub async fn read_through<R, F, Fut>(&self, owner: Option<&OwnerId>, fetch: F) -> Result<Snapshot<R>>
    where
        R: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Listing<R>>>,
    {
        self.read_through_with(owner, fetch, |_| ()).await
    }

    /// [`read_through`](Self::read_through), running `on_current` with the
    /// fetched records when a refetch happened and was not invalidated meanwhile.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when nothing was cached.
    pub async fn read_through_with<R, F, Fut, A>(
        &self,
        owner: Option<&OwnerId>,
        fetch: F,
        on_current: A,
    ) -> Result<Snapshot<R>>
    where
        R: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Listing<R>>>,
        A: FnOnce(&[R]),
    {
        let cached = self.peek::<R>(owner).await;
        if let Some(snapshot) = cached.as_ref().filter(|s| !s.stale) {
            debug!(query = %R::QUERY, "Cache hit");
            return Ok(snapshot.clone());
        }

        let started = self.generation(R::QUERY, owner);
        debug!(query = %R::QUERY, cached = cached.is_some(), "Cache miss, fetching");
        match fetch().await {
            Ok(listing) => Ok(self.store_fetched(owner, listing, started, on_current).await),
            Err(err) => match cached {
                Some(mut snapshot) => {
                    warn!(query = %R::QUERY, error = %err, "Refetch failed, serving stale snapshot");
                    snapshot.refresh_error = Some(err);
                    Ok(snapshot)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mealcart_core::{MealId, Price};

    use super::*;

    fn meal(id: &str) -> MealRecord {
        MealRecord {
            id: MealId::new(id),
            created_at: Utc::now(),
            name: id.to_string(),
            price: Price::from_cents(500),
            image: format!("{id}.png"),
            category: None,
            description: None,
        }
    }

    fn listing(ids: &[&str]) -> Listing<MealRecord> {
        Listing {
            records: ids.iter().map(|id| meal(id)).collect(),
            rejected: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fresh_read_does_not_fetch() {
        let cache = QueryCache::new(&CacheConfig::default());
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let snap = cache
                .read_through::<MealRecord, _, _>(None, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(listing(&["a"]))
                })
                .await
                .unwrap();
            assert!(!snap.stale);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_read_refetches() {
        let cache = QueryCache::new(&CacheConfig::default());
        cache.store(None, listing(&["a"])).await;
        cache.mark_stale(QueryKey::MealsList, None);
        assert!(cache.is_stale(QueryKey::MealsList, None).await);

        let snap = cache
            .read_through::<MealRecord, _, _>(None, || async { Ok(listing(&["a", "b"])) })
            .await
            .unwrap();
        assert_eq!(snap.len(), 2);
        assert!(!cache.is_stale(QueryKey::MealsList, None).await);
    }

    #[tokio::test]
    async fn test_failed_refetch_serves_stale_snapshot() {
        let cache = QueryCache::new(&CacheConfig::default());
        cache.store(None, listing(&["a"])).await;
        cache.mark_stale(QueryKey::MealsList, None);

        let snap = cache
            .read_through::<MealRecord, _, _>(None, || async {
                Err(SyncError::StoreUnavailable("down".to_string()))
            })
            .await
            .unwrap();
        assert!(snap.stale);
        assert_eq!(snap.len(), 1);
        assert!(snap.refresh_error.is_some());
    }

    #[tokio::test]
    async fn test_failed_first_fetch_is_an_error() {
        let cache = QueryCache::new(&CacheConfig::default());
        let result = cache
            .read_through::<MealRecord, _, _>(None, || async {
                Err(SyncError::StoreUnavailable("down".to_string()))
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_owner_scoped_entries_are_separate() {
        let cache = QueryCache::new(&CacheConfig::default());
        let ann = OwnerId::new("ann@example.com");
        let bob = OwnerId::new("bob@example.com");

        cache
            .store::<OrderItem>(Some(&ann), Listing { records: Vec::new(), rejected: Vec::new() })
            .await;
        assert!(!cache.is_stale(QueryKey::OrdersList, Some(&ann)).await);
        assert!(cache.is_stale(QueryKey::OrdersList, Some(&bob)).await);

        // The catalog ignores the owner.
        cache.store(Some(&ann), listing(&["a"])).await;
        assert!(cache.peek::<MealRecord>(Some(&bob)).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_lands_stale() {
        let cache = QueryCache::new(&CacheConfig::default());
        let ann = OwnerId::new("ann@example.com");
        let mut rebuilt = false;

        // Nothing cached yet; the mutation commits while the first fetch runs.
        let snap = cache
            .read_through_with::<OrderItem, _, _, _>(
                Some(&ann),
                || async {
                    cache.mark_stale(QueryKey::OrdersList, Some(&ann));
                    Ok(Listing::default())
                },
                |_| rebuilt = true,
            )
            .await
            .unwrap();
        assert!(snap.stale);
        assert!(!rebuilt);
        assert!(cache.is_stale(QueryKey::OrdersList, Some(&ann)).await);

        // The follow-up read refetches and is current.
        let snap = cache
            .read_through_with::<OrderItem, _, _, _>(
                Some(&ann),
                || async { Ok(Listing::default()) },
                |_| rebuilt = true,
            )
            .await
            .unwrap();
        assert!(!snap.stale);
        assert!(rebuilt);
    }

    #[tokio::test]
    async fn test_mark_stale_after_store_invalidates_entry() {
        let cache = QueryCache::new(&CacheConfig::default());
        let started = cache.generation(QueryKey::MealsList, None);
        cache.mark_stale(QueryKey::MealsList, None);
        assert_ne!(cache.generation(QueryKey::MealsList, None), started);

        let snap = cache.store_fetched(None, listing(&["a"]), started, |_| ()).await;
        assert!(snap.stale);
        assert!(cache.peek::<MealRecord>(None).await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_clear_invalidates_fetches_in_flight() {
        let cache = QueryCache::new(&CacheConfig::default());
        let ann = OwnerId::new("ann@example.com");
        let started = cache.generation(QueryKey::CartList, Some(&ann));
        cache.clear().await;

        let snap = cache
            .store_fetched::<CartItem, _>(Some(&ann), Listing::default(), started, |_| ())
            .await;
        assert!(snap.stale);
    }
}
