//! Core types for Mealcart.
//!
//! This module provides type-safe wrappers for the storefront's domain concepts.

pub mod collection;
pub mod email;
pub mod id;
pub mod price;
pub mod record;

pub use collection::{Collection, MembershipKind, QueryKey};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use record::{CartItem, FavoriteItem, MealRecord, NewMeal, OrderItem};
