//! Unified error taxonomy for the synchronization layer.
//!
//! Every operation exposed to UI callers converts document store failures
//! into a [`SyncError`] before returning; raw transport errors never escape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mealcart_core::{Collection, MealId};

use crate::store::StoreError;

/// Error returned by every synchronization-layer operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Transport or server fault. The optimistic change is rolled back.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    /// The entity was absent when the mutation ran.
    #[error("Not found: {collection} document {id}")]
    NotFound {
        /// Collection that was searched.
        collection: Collection,
        /// Missing document or meal id.
        id: String,
    },

    /// A create collided with an existing document id.
    #[error("Conflict: {collection} document {id} already exists")]
    Conflict {
        /// Collection the create targeted.
        collection: Collection,
        /// Colliding document id.
        id: String,
    },

    /// The meal a favorite or cart item would copy has vanished.
    #[error("Source meal not found: {0}")]
    SourceNotFound(MealId),

    /// A stored document could not be mapped into a typed record.
    #[error("Malformed {collection} record {}: {reason}", id.as_deref().unwrap_or("<no id>"))]
    MalformedRecord {
        /// Collection the document came from.
        collection: Collection,
        /// Document id, when the document had one.
        id: Option<String>,
        /// What was wrong with it.
        reason: String,
    },

    /// A transfer was requested with nothing in the cart.
    #[error("Cart is empty, nothing to transfer")]
    EmptyCart,

    /// No user is signed in.
    #[error("Not signed in")]
    Unauthenticated,
}

/// Field-less discriminant of [`SyncError`], used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`SyncError::StoreUnavailable`].
    StoreUnavailable,
    /// See [`SyncError::NotFound`].
    NotFound,
    /// See [`SyncError::Conflict`].
    Conflict,
    /// See [`SyncError::SourceNotFound`].
    SourceNotFound,
    /// See [`SyncError::MalformedRecord`].
    MalformedRecord,
    /// See [`SyncError::EmptyCart`].
    EmptyCart,
    /// See [`SyncError::Unauthenticated`].
    Unauthenticated,
}

impl SyncError {
    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Self::EmptyCart => ErrorKind::EmptyCart,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
        }
    }

    /// Convert a store error raised while addressing one document.
    pub(crate) fn from_store(err: StoreError, collection: Collection, id: &str) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound {
                collection,
                id: id.to_owned(),
            },
            StoreError::Conflict => Self::Conflict {
                collection,
                id: id.to_owned(),
            },
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
        }
    }

    /// Convert a store error raised by a list call.
    ///
    /// A list never addresses a single document, so `NotFound`/`Conflict`
    /// can only mean the collection itself is misconfigured.
    pub(crate) fn from_list(err: StoreError, collection: Collection) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            other => Self::StoreUnavailable(format!("listing {collection}: {other}")),
        }
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
