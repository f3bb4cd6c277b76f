//! Per-mutation state machine.
//!
//! `Idle → Pending(optimistic) → Committed | RolledBack(reason)`
//!
//! The membership value a mutation wants the index to show is a pure
//! function of its state; see [`MutationState::membership`].

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Lifecycle of one optimistic membership mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationState {
    /// Not started.
    #[default]
    Idle,
    /// Optimistic value applied, remote call in flight.
    Pending { previous: bool, optimistic: bool },
    /// Remote call succeeded; the optimistic value stands.
    Committed { value: bool },
    /// Remote call failed; the previous value is restored.
    RolledBack { value: bool, reason: ErrorKind },
}

impl MutationState {
    /// Enter `Pending` from `Idle`. Any other state is returned unchanged.
    #[must_use]
    pub const fn begin(self, previous: bool, optimistic: bool) -> Self {
        match self {
            Self::Idle => Self::Pending {
                previous,
                optimistic,
            },
            other => other,
        }
    }

    /// Settle a pending mutation as committed.
    #[must_use]
    pub const fn commit(self) -> Self {
        match self {
            Self::Pending { optimistic, .. } => Self::Committed { value: optimistic },
            other => other,
        }
    }

    /// Settle a pending mutation as rolled back.
    #[must_use]
    pub const fn roll_back(self, reason: ErrorKind) -> Self {
        match self {
            Self::Pending { previous, .. } => Self::RolledBack {
                value: previous,
                reason,
            },
            other => other,
        }
    }

    /// Settle from the outcome of the remote call.
    #[must_use]
    pub fn settle<T>(self, outcome: &crate::error::Result<T>) -> Self {
        match outcome {
            Ok(_) => self.commit(),
            Err(err) => self.roll_back(err.kind()),
        }
    }

    /// The membership value the index should show in this state.
    #[must_use]
    pub const fn membership(&self) -> Option<bool> {
        match *self {
            Self::Idle => None,
            Self::Pending { optimistic, .. } => Some(optimistic),
            Self::Committed { value } | Self::RolledBack { value, .. } => Some(value),
        }
    }

    /// Whether the mutation has finished.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::RolledBack { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_idle_has_no_opinion() {
        assert_eq!(MutationState::Idle.membership(), None);
        assert!(!MutationState::Idle.is_settled());
    }

    #[test]
    fn test_commit_keeps_optimistic_value() {
        let state = MutationState::Idle.begin(false, true);
        assert_eq!(state.membership(), Some(true));
        let state = state.commit();
        assert_eq!(state, MutationState::Committed { value: true });
        assert!(state.is_settled());
    }

    #[test]
    fn test_roll_back_restores_previous_value() {
        let state = MutationState::Idle
            .begin(true, false)
            .settle::<()>(&Err(SyncError::StoreUnavailable("down".to_string())));
        assert_eq!(
            state,
            MutationState::RolledBack {
                value: true,
                reason: ErrorKind::StoreUnavailable
            }
        );
        assert_eq!(state.membership(), Some(true));
    }

    #[test]
    fn test_settled_states_are_final() {
        let committed = MutationState::Committed { value: true };
        assert_eq!(committed.roll_back(ErrorKind::NotFound), committed);
        assert_eq!(committed.begin(false, false), committed);
    }
}
