//! Attempt gate errors.

use thiserror::Error;

use crate::registry::StoreError;

/// Failures surfaced by the attempt lifecycle operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// No verified identity on the request.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The user already qualifies and has no reason to attempt.
    #[error("User is already eligible")]
    AlreadyEligible,

    /// A cooldown window is still open.
    #[error("Cooldown active: {hours_left}h left")]
    Cooldown { hours_left: u64 },

    /// A deadline fell outside the representable time range.
    #[error("Lifecycle deadline out of range")]
    DeadlineOutOfRange,

    /// The backing store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}
