//! Command implementations.

pub mod cart;
pub mod catalog;
pub mod favorites;
pub mod orders;

use std::sync::Arc;

use mealcart_core::{Email, EmailError};
use mealcart_sync::{StaticIdentity, Storefront, SyncConfig, SyncError};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur before a command runs.
#[derive(Debug, Error)]
pub enum CliError {
    /// The `--user` value is not an email address.
    #[error("Invalid email {0}: {1}")]
    InvalidEmail(String, EmailError),

    /// The storefront could not be set up.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Build a storefront for `user` and load their memberships.
///
/// # Errors
///
/// Returns an error if `user` is not a valid email, the HTTP client cannot be
/// built, or the memberships cannot be fetched.
pub async fn connect(config: &SyncConfig, user: Option<&str>) -> Result<Storefront, CliError> {
    let identity = StaticIdentity::new();
    if let Some(user) = user {
        let email = Email::parse(user).map_err(|e| CliError::InvalidEmail(user.to_string(), e))?;
        identity.sign_in(email);
    }

    let storefront = Storefront::from_config(config, Arc::new(identity))?;
    if user.is_some() {
        storefront.refresh_memberships().await?;
        debug!("Memberships loaded");
    }
    Ok(storefront)
}

/// Print a line for a stale snapshot whose refetch failed.
pub(crate) fn warn_if_stale<T>(snapshot: &mealcart_sync::Snapshot<T>) {
    if let Some(err) = &snapshot.refresh_error {
        eprintln!("warning: showing data from {} ({err})", snapshot.fetched_at);
    }
    if snapshot.rejected > 0 {
        eprintln!("warning: {} malformed records skipped", snapshot.rejected);
    }
}
