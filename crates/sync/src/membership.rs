//! Membership indexes for favorites and cart.
//!
//! An index maps meal ids to "is favorited / is in cart" for the session.
//! It is a cache, not the source of truth: it is rebuilt from every
//! successful list fetch and otherwise only changes through mutation states.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mealcart_core::MealId;

use crate::mutation::MutationState;

/// Meal id → membership. Unseen ids read as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipIndex {
    entries: HashMap<MealId, bool>,
}

impl MembershipIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index wholesale from a freshly fetched list.
    pub fn rebuild<'a>(&mut self, present: impl IntoIterator<Item = &'a MealId>) {
        self.entries = present.into_iter().map(|id| (id.clone(), true)).collect();
    }

    /// Set a single entry.
    pub fn set(&mut self, id: MealId, present: bool) {
        self.entries.insert(id, present);
    }

    /// Read an entry, `false` for unseen ids.
    #[must_use]
    pub fn get(&self, id: &MealId) -> bool {
        self.entries.get(id).copied().unwrap_or(false)
    }

    /// Project a mutation state onto the entry for `id`.
    pub fn apply(&mut self, id: &MealId, state: &MutationState) {
        if let Some(present) = state.membership() {
            self.entries.insert(id.clone(), present);
        }
    }

    /// Meal ids currently marked present.
    pub fn present(&self) -> impl Iterator<Item = &MealId> {
        self.entries
            .iter()
            .filter_map(|(id, present)| present.then_some(id))
    }
}

/// A [`MembershipIndex`] shared between the engine and its callers.
///
/// Locks are held only for the duration of a single read or write, never
/// across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex {
    inner: Arc<Mutex<MembershipIndex>>,
}

impl SharedIndex {
    /// Create an empty shared index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MembershipIndex> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`MembershipIndex::get`].
    #[must_use]
    pub fn get(&self, id: &MealId) -> bool {
        self.lock().get(id)
    }

    /// See [`MembershipIndex::set`].
    pub fn set(&self, id: MealId, present: bool) {
        self.lock().set(id, present);
    }

    /// See [`MembershipIndex::apply`].
    pub fn apply(&self, id: &MealId, state: &MutationState) {
        self.lock().apply(id, state);
    }

    /// See [`MembershipIndex::rebuild`].
    pub fn rebuild<'a>(&self, present: impl IntoIterator<Item = &'a MealId>) {
        self.lock().rebuild(present);
    }

    /// A point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> MembershipIndex {
        self.lock().clone()
    }
}
