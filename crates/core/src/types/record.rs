//! Typed records for the four storefront collections.
//!
//! Every record shares the display shape `{id, created_at, name, price, image}`.
//! Favorites and cart items are denormalized copies of a meal plus a link back
//! to it; orders are independent copies of a cart item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CartItemId, FavoriteId, MealId, OrderId, OwnerId};
use super::price::Price;

/// A catalog meal. Owned by the catalog, never by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRecord {
    pub id: MealId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub price: Price,
    /// Image URL.
    pub image: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// A meal the owner marked as favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteItem {
    pub id: FavoriteId,
    pub created_at: DateTime<Utc>,
    pub meal_id: MealId,
    pub name: String,
    pub price: Price,
    pub image: String,
    pub owner_id: OwnerId,
}

/// A meal sitting in the owner's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub created_at: DateTime<Utc>,
    pub meal_id: MealId,
    pub name: String,
    pub price: Price,
    pub image: String,
    /// Copied from the meal so the order can carry it.
    pub description: Option<String>,
    pub owner_id: OwnerId,
}

/// An order line created from a cart item.
///
/// Has its own lifecycle: removing the source cart item never touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub price: Price,
    pub image: String,
    pub description: Option<String>,
    pub owner_id: OwnerId,
}

/// Input for creating a catalog meal.
///
/// `image` must already be a hosted URL; uploading is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMeal {
    pub name: String,
    pub price: Price,
    pub image: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl CartItem {
    /// True when this cart item and `order` show the same thing to the user.
    #[must_use]
    pub fn matches_order(&self, order: &OrderItem) -> bool {
        self.name == order.name
            && self.price == order.price
            && self.image == order.image
            && self.description == order.description
            && self.owner_id == order.owner_id
    }
}
