//! In-memory document store with fault injection.
//!
//! Backs tests and offline demos. Faults let a caller make specific calls
//! fail with [`StoreError::Unavailable`], and call counters make cache hits
//! observable.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DocumentStore, Filter, RawDocument, StoreError};

/// Store operation, used to target faults and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Get,
    Create,
    Delete,
}

/// A scripted failure.
///
/// By default a fault fails every matching call; [`Fault::times`] limits it.
#[derive(Debug, Clone)]
pub struct Fault {
    op: StoreOp,
    collection: String,
    matching: Option<(String, Value)>,
    remaining: Option<usize>,
}

impl Fault {
    /// Fail `op` calls against `collection`.
    #[must_use]
    pub fn on(op: StoreOp, collection: impl Into<String>) -> Self {
        Self {
            op,
            collection: collection.into(),
            matching: None,
            remaining: None,
        }
    }

    /// Only fail when the document involved has `field == value`.
    ///
    /// For creates the new fields are checked, for gets and deletes the
    /// stored document. List calls ignore this restriction.
    #[must_use]
    pub fn when(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.matching = Some((field.into(), value.into()));
        self
    }

    /// Fail only the next `n` matching calls.
    #[must_use]
    pub const fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    fn applies(&self, op: StoreOp, collection: &str, doc: Option<&RawDocument>) -> bool {
        if self.op != op || self.collection != collection {
            return false;
        }
        if op == StoreOp::List {
            return true;
        }
        match (&self.matching, doc) {
            (None, _) => true,
            (Some((field, value)), Some(doc)) => doc.get(field) == Some(value),
            (Some(_), None) => false,
        }
    }
}

/// Thread-safe in-memory [`DocumentStore`].
///
/// Cheap to clone; clones share the same documents.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    collections: RwLock<HashMap<String, BTreeMap<String, RawDocument>>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<(StoreOp, String), usize>>,
    latency: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, so in-flight state can be observed.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.inner.latency) = latency;
    }

    /// Register a fault.
    pub fn inject(&self, fault: Fault) {
        lock(&self.inner.faults).push(fault);
    }

    /// Remove every registered fault.
    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    /// Number of `op` calls made against `collection`, faulted ones included.
    #[must_use]
    pub fn calls(&self, op: StoreOp, collection: &str) -> usize {
        lock(&self.inner.calls)
            .get(&(op, collection.to_owned()))
            .copied()
            .unwrap_or(0)
    }

    /// Insert a document directly, bypassing faults and counters.
    ///
    /// `$id` must be set; `$createdAt` defaults to now.
    pub async fn seed(&self, collection: &str, mut doc: RawDocument) {
        let Some(id) = doc.id().map(str::to_owned) else {
            return;
        };
        stamp_created_at(&mut doc);
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_owned())
            .or_default()
            .insert(id, doc);
    }

    /// Every document in `collection`, unfiltered.
    pub async fn documents(&self, collection: &str) -> Vec<RawDocument> {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn enter(&self, op: StoreOp, collection: &str) {
        *lock(&self.inner.calls)
            .entry((op, collection.to_owned()))
            .or_insert(0) += 1;
        let latency = *lock(&self.inner.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_fault(
        &self,
        op: StoreOp,
        collection: &str,
        doc: Option<&RawDocument>,
    ) -> Result<(), StoreError> {
        let mut faults = lock(&self.inner.faults);
        let Some(fault) = faults
            .iter_mut()
            .find(|f| f.applies(op, collection, doc))
        else {
            return Ok(());
        };
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        faults.retain(|f| f.remaining != Some(0));
        debug!(?op, collection, "Injected store fault");
        Err(StoreError::Unavailable(format!(
            "injected fault on {op:?} {collection}"
        )))
    }
}

fn stamp_created_at(doc: &mut RawDocument) {
    if doc.created_at().is_none() {
        doc.fields_mut().insert(
            RawDocument::CREATED_AT.to_owned(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_documents(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, StoreError> {
        self.enter(StoreOp::List, collection).await;
        self.take_fault(StoreOp::List, collection, None)?;

        Ok(self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<RawDocument, StoreError> {
        self.enter(StoreOp::Get, collection).await;
        let doc = self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        self.take_fault(StoreOp::Get, collection, doc.as_ref())?;
        doc.ok_or(StoreError::NotFound)
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawDocument, StoreError> {
        self.enter(StoreOp::Create, collection).await;
        let mut doc = RawDocument::new(fields);
        self.take_fault(StoreOp::Create, collection, Some(&doc))?;

        doc.fields_mut()
            .insert(RawDocument::ID.to_owned(), Value::String(id.to_owned()));
        stamp_created_at(&mut doc);

        let mut collections = self.inner.collections.write().await;
        let docs = collections.entry(collection.to_owned()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::Conflict);
        }
        docs.insert(id.to_owned(), doc.clone());
        Ok(doc)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.enter(StoreOp::Delete, collection).await;
        let existing = self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();
        self.take_fault(StoreOp::Delete, collection, existing.as_ref())?;

        self.inner
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryStore::new();
        let created = store
            .create_document("meals", "m1", fields(json!({"name": "Pho"})))
            .await
            .unwrap();
        assert_eq!(created.id(), Some("m1"));
        assert!(created.created_at().is_some());

        let fetched = store.get_document("meals", "m1").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = InMemoryStore::new();
        store
            .create_document("cart", "c1", Map::new())
            .await
            .unwrap();
        let err = store
            .create_document("cart", "c1", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.delete_document("cart", "nope").await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_list_empty_collection_is_empty() {
        let store = InMemoryStore::new();
        let docs = store.list_documents("orders", &Filter::all()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_fault_matching_field_only_hits_that_document() {
        let store = InMemoryStore::new();
        store.inject(Fault::on(StoreOp::Create, "orders").when("name", "B"));

        assert!(
            store
                .create_document("orders", "o1", fields(json!({"name": "A"})))
                .await
                .is_ok()
        );
        assert!(matches!(
            store
                .create_document("orders", "o2", fields(json!({"name": "B"})))
                .await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.documents("orders").await.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_times_expires() {
        let store = InMemoryStore::new();
        store.inject(Fault::on(StoreOp::List, "meals").times(1));

        assert!(store.list_documents("meals", &Filter::all()).await.is_err());
        assert!(store.list_documents("meals", &Filter::all()).await.is_ok());
        assert_eq!(store.calls(StoreOp::List, "meals"), 2);
    }
}
