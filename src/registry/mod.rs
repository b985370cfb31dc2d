//! Attempt & cooldown registry.
//!
//! The registry is the single authoritative record of each user's current
//! attempt and cooldown deadline. It performs no clock logic: cooldown
//! deadlines are returned even when already in the past and callers compare
//! them against "now".
//!
//! Besides the plain per-field operations, every user owns a versioned
//! [`Slot`]. [`AttemptStore::commit`] is a check-and-set against the version
//! that was read, so a caller can do slow work (the eligibility lookup)
//! between reading and writing without losing a concurrent update.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::attempt::{Attempt, UserId};

pub use memory::InMemoryRegistry;

/// Errors reported by an [`AttemptStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The slot changed between `load` and `commit`.
    #[error("Slot for user {user_id} changed: expected version {expected}, found {actual}")]
    VersionConflict {
        user_id: UserId,
        expected: u64,
        actual: u64,
    },

    /// The backing storage failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Everything stored for one user, plus the version it was read at.
///
/// A user that was never written reads as an empty slot at version 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    pub attempt: Option<Attempt>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub version: u64,
}

/// A single-key mutation applied atomically to a [`Slot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotWrite {
    /// Store a new attempt. The cooldown deadline is left untouched.
    PutAttempt(Attempt),
    /// Drop any attempt and open a cooldown until the given instant.
    Close { cooldown_until: DateTime<Utc> },
}

impl SlotWrite {
    /// Apply this write to a slot and bump its version.
    pub fn apply_to(self, slot: &mut Slot) -> u64 {
        match self {
            SlotWrite::PutAttempt(attempt) => slot.attempt = Some(attempt),
            SlotWrite::Close { cooldown_until } => {
                slot.attempt = None;
                slot.cooldown_until = Some(cooldown_until);
            }
        }
        slot.version += 1;
        slot.version
    }
}

/// Storage seam for attempts and cooldowns.
///
/// Implementations must keep each user's slot consistent on its own; no
/// operation spans more than one user.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Store an attempt, overwriting any existing one.
    async fn put_attempt(&self, user_id: &UserId, attempt: Attempt) -> Result<(), StoreError>;

    async fn get_attempt(&self, user_id: &UserId) -> Result<Option<Attempt>, StoreError>;

    /// Remove the attempt. A no-op when there is none.
    async fn clear_attempt(&self, user_id: &UserId) -> Result<(), StoreError>;

    /// Store a cooldown deadline, overwriting any existing one.
    async fn put_cooldown(&self, user_id: &UserId, until: DateTime<Utc>) -> Result<(), StoreError>;

    /// The stored deadline, even if it already passed.
    async fn get_cooldown(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Read the whole slot with its current version.
    async fn load(&self, user_id: &UserId) -> Result<Slot, StoreError>;

    /// Apply `write` only if the slot is still at `expected_version`.
    ///
    /// Returns the new version, or [`StoreError::VersionConflict`].
    async fn commit(
        &self,
        user_id: &UserId,
        expected_version: u64,
        write: SlotWrite,
    ) -> Result<u64, StoreError>;

    /// Apply `write` regardless of the current version.
    async fn apply(&self, user_id: &UserId, write: SlotWrite) -> Result<u64, StoreError>;
}
