//! Document Store collaborator.
//!
//! # Architecture
//!
//! - The remote store is a black box exposing list/get/create/delete over
//!   named collections of schemaless documents
//! - Lists are filtered by AND-combined equality predicates
//! - Two implementations: [`HttpDocumentStore`] for the live REST API and
//!   [`InMemoryStore`] for tests, demos and offline use
//!
//! Documents travel as [`RawDocument`]s; typed mapping happens in
//! `crate::mapper`.

mod http;
mod memory;

pub use http::HttpDocumentStore;
pub use memory::{Fault, InMemoryStore, StoreOp};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors a document store can raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No document with the requested id.
    #[error("document not found")]
    NotFound,

    /// A document with the requested id already exists.
    #[error("document already exists")]
    Conflict,

    /// Transport, timeout or server fault.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A schemaless document as returned by the store.
///
/// System attributes use a `$` prefix (`$id`, `$createdAt`); everything else
/// is caller data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument(Map<String, Value>);

impl RawDocument {
    /// System attribute holding the document id.
    pub const ID: &'static str = "$id";
    /// System attribute holding the RFC 3339 creation time.
    pub const CREATED_AT: &'static str = "$createdAt";

    /// Wrap a JSON object.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The document id, if present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.get(Self::ID).and_then(Value::as_str)
    }

    /// The creation timestamp, if present.
    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.0.get(Self::CREATED_AT).and_then(Value::as_str)
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// All fields including system attributes.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutable access to the fields.
    pub const fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }
}

impl From<Map<String, Value>> for RawDocument {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// AND-combined equality predicates over document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<(String, Value)>,
}

impl Filter {
    /// A filter matching every document.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Add `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((field.into(), value.into()));
        self
    }

    /// The predicates in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[(String, Value)] {
        &self.predicates
    }

    /// Whether `doc` satisfies every predicate.
    #[must_use]
    pub fn matches(&self, doc: &RawDocument) -> bool {
        self.predicates
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// Create/read/list/delete over named collections.
///
/// Implementations surface timeouts and transport faults as
/// [`StoreError::Unavailable`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List documents in `collection` matching `filter`. No match is an empty list.
    async fn list_documents(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<RawDocument>, StoreError>;

    /// Fetch one document by id.
    async fn get_document(&self, collection: &str, id: &str) -> Result<RawDocument, StoreError>;

    /// Create a document under a caller-chosen id.
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<RawDocument, StoreError>;

    /// Delete a document by id.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> RawDocument {
        match value {
            Value::Object(map) => RawDocument::new(map),
            _ => RawDocument::default(),
        }
    }

    #[test]
    fn test_filter_all_matches_everything() {
        assert!(Filter::all().matches(&doc(json!({"$id": "a"}))));
    }

    #[test]
    fn test_filter_requires_every_predicate() {
        let filter = Filter::all().eq("mealId", "m1").eq("user", "ann@example.com");
        assert!(filter.matches(&doc(json!({"mealId": "m1", "user": "ann@example.com"}))));
        assert!(!filter.matches(&doc(json!({"mealId": "m1", "user": "bob@example.com"}))));
        assert!(!filter.matches(&doc(json!({"mealId": "m1"}))));
    }

    #[test]
    fn test_system_attributes() {
        let d = doc(json!({"$id": "x", "$createdAt": "2024-05-01T10:00:00.000+00:00"}));
        assert_eq!(d.id(), Some("x"));
        assert_eq!(d.created_at(), Some("2024-05-01T10:00:00.000+00:00"));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Unavailable("HTTP 503".to_string()).to_string(),
            "store unavailable: HTTP 503"
        );
    }
}
