//! Mealcart synchronization layer.
//!
//! Keeps a storefront UI's view of favorites, cart and orders consistent
//! with a remote document store:
//!
//! - [`store`] - the document store collaborator, in-memory and HTTP
//! - [`mapper`] - raw documents to typed records
//! - [`gateway`] - per-collection list/get/create/remove, scoped by owner
//! - [`membership`] - "is favorited / in cart" indexes
//! - [`mutation`] - optimistic toggles with rollback
//! - [`transfer`] - cart to orders
//! - [`cache`] - list snapshots with staleness
//! - [`storefront`] - the facade UI callers use
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mealcart_core::{Email, MealId};
//! use mealcart_sync::{
//!     CacheConfig, CollectionIds, InMemoryStore, StaticIdentity, Storefront,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = StaticIdentity::signed_in(Email::parse("ann@example.com")?);
//! let storefront = Storefront::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(identity),
//!     CollectionIds::default(),
//!     &CacheConfig::default(),
//! );
//!
//! storefront.toggle_favorite(&MealId::new("meal-1")).await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod mapper;
pub mod membership;
pub mod mutation;
pub mod store;
pub mod storefront;
pub mod transfer;

pub use cache::{QueryCache, Snapshot};
pub use config::{CacheConfig, CollectionIds, ConfigError, DocumentStoreConfig, SyncConfig};
pub use error::{ErrorKind, Result, SyncError};
pub use identity::{CurrentUser, Identity, StaticIdentity};
pub use mutation::{MutationEffect, MutationOutcome, MutationState};
pub use store::{DocumentStore, Fault, HttpDocumentStore, InMemoryStore, StoreError, StoreOp};
pub use storefront::{CartTotal, MutationFamily, Storefront};
pub use transfer::{TransferFailure, TransferReport, TransferStage, Transferred};
