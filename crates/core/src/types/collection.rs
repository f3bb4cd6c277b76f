//! Logical collections, membership kinds and cached query keys.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A logical collection in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Meals,
    Favorites,
    Cart,
    Orders,
}

impl Collection {
    /// Default collection id in the document store.
    #[must_use]
    pub const fn default_id(self) -> &'static str {
        match self {
            Self::Meals => "meals",
            Self::Favorites => "favorites",
            Self::Cart => "cart",
            Self::Orders => "orders",
        }
    }

    /// The list query that must be refetched after this collection changes.
    #[must_use]
    pub const fn list_query(self) -> QueryKey {
        match self {
            Self::Meals => QueryKey::MealsList,
            Self::Favorites => QueryKey::FavoritesList,
            Self::Cart => QueryKey::CartList,
            Self::Orders => QueryKey::OrdersList,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_id())
    }
}

/// Collections tracked by a membership index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    Favorites,
    Cart,
}

impl MembershipKind {
    /// The backing collection.
    #[must_use]
    pub const fn collection(self) -> Collection {
        match self {
            Self::Favorites => Collection::Favorites,
            Self::Cart => Collection::Cart,
        }
    }
}

/// Read queries whose results are cached and invalidated by mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKey {
    #[serde(rename = "meals-list")]
    MealsList,
    #[serde(rename = "favorites-list")]
    FavoritesList,
    #[serde(rename = "cart-list")]
    CartList,
    #[serde(rename = "orders-list")]
    OrdersList,
}

impl QueryKey {
    /// Whether results of this query are scoped to one owner.
    #[must_use]
    pub const fn is_owner_scoped(self) -> bool {
        !matches!(self, Self::MealsList)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MealsList => "meals-list",
            Self::FavoritesList => "favorites-list",
            Self::CartList => "cart-list",
            Self::OrdersList => "orders-list",
        })
    }
}
