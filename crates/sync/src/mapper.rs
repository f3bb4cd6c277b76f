//! Entity mapping between raw store documents and typed records.
//!
//! Mapping is strict about the shared display shape: a document without
//! `$id`, `$createdAt`, `name`, `price` or `image` is rejected with a
//! [`MapError`] instead of yielding a half-filled record. Unknown fields are
//! ignored.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use mealcart_core::{
    CartItem, CartItemId, Collection, FavoriteId, FavoriteItem, MealId, MealRecord,
    MembershipKind, NewMeal, OrderId, OrderItem, OwnerId, Price,
};

use crate::error::SyncError;
use crate::store::RawDocument;

/// Document field names shared with the remote collections.
pub mod fields {
    /// Owner email on favorites, cart items and orders.
    pub const OWNER: &str = "user";
    /// Source meal of a favorite or cart item.
    pub const MEAL_ID: &str = "mealId";
    pub const NAME: &str = "name";
    pub const PRICE: &str = "price";
    pub const IMAGE: &str = "image";
    pub const CATEGORY: &str = "category";
    pub const DESCRIPTION: &str = "description";
}

/// Why a document could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// A record type stored in one collection.
pub trait StoredRecord: Sized + Clone + Send + Sync + 'static {
    /// The collection holding these records.
    const COLLECTION: Collection;

    /// Map a raw document.
    ///
    /// # Errors
    ///
    /// Returns `MapError` when a required field is missing or mistyped.
    fn from_document(doc: &RawDocument) -> Result<Self, MapError>;

    /// The record's document id.
    fn document_id(&self) -> &str;
}

/// A record visible only to the user who owns it.
pub trait OwnedRecord: StoredRecord {
    fn owner_id(&self) -> &OwnerId;
}

/// A favorite or cart record linking an owner to a meal.
pub trait MembershipRecord: OwnedRecord {
    const KIND: MembershipKind;

    /// The meal this record points at.
    fn meal_id(&self) -> &MealId;

    /// Deterministic document id for `(owner, meal)`.
    fn membership_id(owner: &OwnerId, meal: &MealId) -> String;

    /// Fields of a new record copying `meal` for `owner`.
    fn draft(meal: &MealRecord, owner: &OwnerId) -> Map<String, Value>;
}

/// Map a document, attaching collection and id context to failures.
///
/// # Errors
///
/// Returns `SyncError::MalformedRecord` when mapping fails.
pub fn map_document<R: StoredRecord>(doc: &RawDocument) -> Result<R, SyncError> {
    R::from_document(doc).map_err(|err| SyncError::MalformedRecord {
        collection: R::COLLECTION,
        id: doc.id().map(str::to_owned),
        reason: err.to_string(),
    })
}

// =============================================================================
// Record Implementations
// =============================================================================

impl StoredRecord for MealRecord {
    const COLLECTION: Collection = Collection::Meals;

    fn from_document(doc: &RawDocument) -> Result<Self, MapError> {
        Ok(Self {
            id: MealId::new(document_id(doc)?),
            created_at: created_at(doc)?,
            name: required_str(doc, fields::NAME)?,
            price: price(doc)?,
            image: required_str(doc, fields::IMAGE)?,
            category: optional_str(doc, fields::CATEGORY)?,
            description: optional_str(doc, fields::DESCRIPTION)?,
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

impl StoredRecord for FavoriteItem {
    const COLLECTION: Collection = Collection::Favorites;

    fn from_document(doc: &RawDocument) -> Result<Self, MapError> {
        Ok(Self {
            id: FavoriteId::new(document_id(doc)?),
            created_at: created_at(doc)?,
            meal_id: MealId::new(required_str(doc, fields::MEAL_ID)?),
            name: required_str(doc, fields::NAME)?,
            price: price(doc)?,
            image: required_str(doc, fields::IMAGE)?,
            owner_id: OwnerId::new(required_str(doc, fields::OWNER)?),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

impl OwnedRecord for FavoriteItem {
    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
}

impl MembershipRecord for FavoriteItem {
    const KIND: MembershipKind = MembershipKind::Favorites;

    fn meal_id(&self) -> &MealId {
        &self.meal_id
    }

    fn membership_id(owner: &OwnerId, meal: &MealId) -> String {
        FavoriteId::for_membership(owner, meal).into_inner()
    }

    fn draft(meal: &MealRecord, owner: &OwnerId) -> Map<String, Value> {
        let mut map = display_fields(&meal.name, meal.price, &meal.image);
        map.insert(fields::MEAL_ID.into(), meal.id.as_str().into());
        map.insert(fields::OWNER.into(), owner.as_str().into());
        map
    }
}

impl StoredRecord for CartItem {
    const COLLECTION: Collection = Collection::Cart;

    fn from_document(doc: &RawDocument) -> Result<Self, MapError> {
        Ok(Self {
            id: CartItemId::new(document_id(doc)?),
            created_at: created_at(doc)?,
            meal_id: MealId::new(required_str(doc, fields::MEAL_ID)?),
            name: required_str(doc, fields::NAME)?,
            price: price(doc)?,
            image: required_str(doc, fields::IMAGE)?,
            description: optional_str(doc, fields::DESCRIPTION)?,
            owner_id: OwnerId::new(required_str(doc, fields::OWNER)?),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

impl OwnedRecord for CartItem {
    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
}

impl MembershipRecord for CartItem {
    const KIND: MembershipKind = MembershipKind::Cart;

    fn meal_id(&self) -> &MealId {
        &self.meal_id
    }

    fn membership_id(owner: &OwnerId, meal: &MealId) -> String {
        CartItemId::for_membership(owner, meal).into_inner()
    }

    fn draft(meal: &MealRecord, owner: &OwnerId) -> Map<String, Value> {
        let mut map = display_fields(&meal.name, meal.price, &meal.image);
        if let Some(description) = &meal.description {
            map.insert(fields::DESCRIPTION.into(), description.as_str().into());
        }
        map.insert(fields::MEAL_ID.into(), meal.id.as_str().into());
        map.insert(fields::OWNER.into(), owner.as_str().into());
        map
    }
}

impl StoredRecord for OrderItem {
    const COLLECTION: Collection = Collection::Orders;

    fn from_document(doc: &RawDocument) -> Result<Self, MapError> {
        Ok(Self {
            id: OrderId::new(document_id(doc)?),
            created_at: created_at(doc)?,
            name: required_str(doc, fields::NAME)?,
            price: price(doc)?,
            image: required_str(doc, fields::IMAGE)?,
            description: optional_str(doc, fields::DESCRIPTION)?,
            owner_id: OwnerId::new(required_str(doc, fields::OWNER)?),
        })
    }

    fn document_id(&self) -> &str {
        self.id.as_str()
    }
}

impl OwnedRecord for OrderItem {
    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }
}

// =============================================================================
// Draft Builders
// =============================================================================

/// Fields of a new order copied from `item`.
#[must_use]
pub fn order_fields(item: &CartItem) -> Map<String, Value> {
    let mut map = display_fields(&item.name, item.price, &item.image);
    if let Some(description) = &item.description {
        map.insert(fields::DESCRIPTION.into(), description.as_str().into());
    }
    map.insert(fields::OWNER.into(), item.owner_id.as_str().into());
    map
}

/// Fields of a new catalog meal.
#[must_use]
pub fn meal_fields(meal: &NewMeal) -> Map<String, Value> {
    let mut map = display_fields(&meal.name, meal.price, &meal.image);
    if let Some(category) = &meal.category {
        map.insert(fields::CATEGORY.into(), category.as_str().into());
    }
    if let Some(description) = &meal.description {
        map.insert(fields::DESCRIPTION.into(), description.as_str().into());
    }
    map
}

fn display_fields(name: &str, price: Price, image: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields::NAME.into(), name.into());
    map.insert(fields::PRICE.into(), price_value(price));
    map.insert(fields::IMAGE.into(), image.into());
    map
}

/// Prices are stored as JSON numbers; fall back to a string if the amount
/// has no finite `f64` form.
fn price_value(price: Price) -> Value {
    price
        .amount()
        .to_f64()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(price.amount().to_string()), Value::Number)
}

// =============================================================================
// Field Readers
// =============================================================================

fn document_id(doc: &RawDocument) -> Result<String, MapError> {
    match doc.id() {
        Some(id) if !id.is_empty() => Ok(id.to_owned()),
        _ => Err(MapError::Missing(RawDocument::ID)),
    }
}

fn created_at(doc: &RawDocument) -> Result<DateTime<Utc>, MapError> {
    let raw = doc
        .created_at()
        .ok_or(MapError::Missing(RawDocument::CREATED_AT))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MapError::Invalid {
            field: RawDocument::CREATED_AT,
            reason: e.to_string(),
        })
}

fn required_str(doc: &RawDocument, field: &'static str) -> Result<String, MapError> {
    match doc.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        None | Some(Value::Null) => Err(MapError::Missing(field)),
        Some(other) => Err(MapError::Invalid {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn optional_str(doc: &RawDocument, field: &'static str) -> Result<Option<String>, MapError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(MapError::Invalid {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn price(doc: &RawDocument) -> Result<Price, MapError> {
    let invalid = |reason: String| MapError::Invalid {
        field: fields::PRICE,
        reason,
    };

    let text = match doc.get(fields::PRICE) {
        None | Some(Value::Null) => return Err(MapError::Missing(fields::PRICE)),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(other) => return Err(invalid(format!("expected a number, got {other}"))),
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| invalid(e.to_string()))?;
    Price::new(amount).ok_or_else(|| invalid(format!("negative amount {amount}")))
}
