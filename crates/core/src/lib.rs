//! Mealcart Core - Shared domain types.
//!
//! This crate provides the types shared by every Mealcart component:
//! - `sync` - Client-side synchronization layer over the remote document store
//! - `cli` - Command-line front end driving the synchronization layer
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no document store access,
//! no HTTP clients. Conversions from raw store documents live in `sync`.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, prices, records and collection enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
