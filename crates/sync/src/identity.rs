//! Identity collaborator.
//!
//! Resolves the signed-in user once per top-level operation; gateways only
//! ever see the resulting [`OwnerId`].

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use mealcart_core::{Email, OwnerId};

use crate::error::{Result, SyncError};

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    /// Owner key stamped on the user's documents.
    pub id: OwnerId,
    pub email: Email,
}

impl CurrentUser {
    #[must_use]
    pub fn new(email: Email) -> Self {
        Self {
            id: email.owner_id(),
            email,
        }
    }
}

/// Source of the current user.
#[async_trait]
pub trait Identity: Send + Sync {
    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Unauthenticated` when nobody is signed in.
    async fn current_user(&self) -> Result<CurrentUser>;
}

/// An identity set explicitly by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Arc<RwLock<Option<CurrentUser>>>,
}

impl StaticIdentity {
    /// An identity with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An identity already signed in as `email`.
    #[must_use]
    pub fn signed_in(email: Email) -> Self {
        let identity = Self::new();
        identity.sign_in(email);
        identity
    }

    /// Sign in as `email`, replacing any current user.
    pub fn sign_in(&self, email: Email) -> CurrentUser {
        let user = CurrentUser::new(email);
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        user
    }

    /// Sign the current user out.
    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl Identity for StaticIdentity {
    async fn current_user(&self) -> Result<CurrentUser> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SyncError::Unauthenticated)
    }
}
