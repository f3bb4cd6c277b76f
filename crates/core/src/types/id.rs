//! Newtype ids for type-safe document references.
//!
//! Document store ids are opaque strings. The `define_id!` macro wraps them
//! so a favorite id can never be passed where a meal id is expected.

use uuid::Uuid;

/// Namespace for deterministic membership document ids.
const MEMBERSHIP_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_616c_6361_7274_8000_0000_0000_0001);

/// Macro to define a type-safe string id wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `generate()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Into<String>` implementations
///
/// # Example
///
/// ```rust
/// # use mealcart_core::define_id;
/// define_id!(ReviewId);
/// define_id!(CouponId);
///
/// let review = ReviewId::new("r-1");
/// let coupon = CouponId::new("r-1");
///
/// // These are different types, so this won't compile:
/// // let _: ReviewId = coupon;
/// assert_eq!(review.as_str(), coupon.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing document id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random (v4 UUID) id.
            #[must_use]
            pub fn generate() -> Self {
                Self(::uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the underlying id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the underlying id.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(MealId);
define_id!(FavoriteId);
define_id!(CartItemId);
define_id!(OrderId);
define_id!(OwnerId);

/// Deterministic document id for a membership (favorite or cart) document.
///
/// The same `(owner, meal)` pair always yields the same id, so two racing
/// inserts collide in the store instead of creating duplicates.
#[must_use]
pub fn membership_document_id(owner: &OwnerId, meal: &MealId) -> String {
    let name = format!("{}/{}", owner.as_str(), meal.as_str());
    Uuid::new_v5(&MEMBERSHIP_NAMESPACE, name.as_bytes()).to_string()
}

impl FavoriteId {
    /// Id of the favorite document linking `owner` to `meal`.
    #[must_use]
    pub fn for_membership(owner: &OwnerId, meal: &MealId) -> Self {
        Self(membership_document_id(owner, meal))
    }
}

impl CartItemId {
    /// Id of the cart document linking `owner` to `meal`.
    #[must_use]
    pub fn for_membership(owner: &OwnerId, meal: &MealId) -> Self {
        Self(membership_document_id(owner, meal))
    }
}
