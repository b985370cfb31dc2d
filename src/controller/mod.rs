//! Attempt lifecycle controller.
//!
//! Per-user state machine over `{Idle, Active, Cooldown}`. Cooldown is not
//! stored as its own state: it is "no live attempt and a deadline in the
//! future".
//!
//! # Operations
//!
//! - [`AttemptController::start`] — eligibility check, cooldown gate, resume or
//!   create an attempt
//! - [`AttemptController::status`] — read-only snapshot of time left
//! - [`AttemptController::finish`] — close the attempt and open a cooldown
//!
//! `start` awaits the eligibility oracle before touching the registry. The
//! registry write that follows is a versioned check-and-set, so two
//! concurrent starts for one user converge on a single attempt instead of
//! the last writer silently replacing the first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::{hours_ceil, Attempt, FormVariant, GateError, UserId};
use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::eligibility::EligibilityOracle;
use crate::registry::{AttemptStore, Slot, SlotWrite, StoreError};

/// How many times `start` re-reads the slot after losing a write race.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Result of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedAttempt {
    pub attempt: Attempt,
    /// `true` when an already-live attempt was returned unchanged.
    pub resumed: bool,
}

/// Read-only view of a user's attempt and cooldown.
///
/// The attempt figures are unpenalized; the server never sees the client's
/// penalty ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptStatus {
    pub cooldown_ms_left: u64,
    pub cooldown_hours_left: u64,
    pub attempt_ms_left: u64,
    pub attempt_seconds_left: u64,
    pub duration_minutes: u64,
    pub form_variant: Option<FormVariant>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
}

impl AttemptStatus {
    /// Whether the server still considers an attempt in progress.
    pub fn has_live_attempt(&self) -> bool {
        self.started_at.is_some() && self.form_variant.is_some()
    }
}

/// Result of `finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReceipt {
    pub cooldown_hours: u64,
    pub cooldown_until: DateTime<Utc>,
}

enum Decision {
    Reject { hours_left: u64 },
    Resume(Attempt),
    Create(Attempt),
    /// The stored attempt ran out without a finish; close it first.
    CloseStale { cooldown_until: DateTime<Utc> },
}

pub struct AttemptController {
    store: Arc<dyn AttemptStore>,
    oracle: Arc<dyn EligibilityOracle>,
    clock: Arc<dyn Clock>,
    lifecycle: LifecycleConfig,
}

impl AttemptController {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        oracle: Arc<dyn EligibilityOracle>,
        clock: Arc<dyn Clock>,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            clock,
            lifecycle,
        }
    }

    pub fn lifecycle(&self) -> LifecycleConfig {
        self.lifecycle
    }

    /// Start a new attempt or resume the live one.
    ///
    /// Fails with [`GateError::AlreadyEligible`] when the oracle says the user
    /// already qualifies, and with [`GateError::Cooldown`] while a cooldown is
    /// open. An attempt that ran past its duration without being finished is
    /// closed here exactly as `finish` would close it, which opens a fresh
    /// cooldown and fails this call.
    pub async fn start(&self, user_id: &UserId) -> Result<StartedAttempt, GateError> {
        if self.oracle.is_eligible(user_id).await {
            tracing::info!(user = %user_id, "User already eligible, refusing attempt");
            return Err(GateError::AlreadyEligible);
        }

        let mut last_conflict = None;
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let slot = self.store.load(user_id).await?;
            let now = self.clock.now();

            let (write, outcome) = match self.decide(user_id, &slot, now)? {
                Decision::Reject { hours_left } => {
                    tracing::info!(user = %user_id, hours_left, "Attempt refused, cooldown active");
                    return Err(GateError::Cooldown { hours_left });
                }
                Decision::Resume(attempt) => {
                    tracing::info!(
                        user = %user_id,
                        variant = %attempt.form_variant,
                        "Resuming live attempt"
                    );
                    return Ok(StartedAttempt {
                        attempt,
                        resumed: true,
                    });
                }
                Decision::Create(attempt) => (
                    SlotWrite::PutAttempt(attempt.clone()),
                    Ok(StartedAttempt {
                        attempt,
                        resumed: false,
                    }),
                ),
                Decision::CloseStale { cooldown_until } => (
                    SlotWrite::Close { cooldown_until },
                    Err(GateError::Cooldown {
                        hours_left: self.lifecycle.cooldown_hours,
                    }),
                ),
            };

            match self.store.commit(user_id, slot.version, write).await {
                Ok(_) => {
                    match &outcome {
                        Ok(started) => tracing::info!(
                            user = %user_id,
                            variant = %started.attempt.form_variant,
                            "Attempt started"
                        ),
                        Err(_) => tracing::info!(
                            user = %user_id,
                            "Attempt expired without finish, cooldown opened"
                        ),
                    }
                    return outcome;
                }
                Err(conflict @ StoreError::VersionConflict { .. }) => {
                    tracing::debug!(user = %user_id, "Lost start race, re-reading slot: {}", conflict);
                    last_conflict = Some(conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_conflict
            .unwrap_or_else(|| StoreError::Backend("start retries exhausted".to_string()))
            .into())
    }

    /// Snapshot of cooldown and attempt time left.
    pub async fn status(&self, user_id: &UserId) -> Result<AttemptStatus, GateError> {
        let slot = self.store.load(user_id).await?;
        let now = self.clock.now();

        let cooldown_ms_left = slot
            .cooldown_until
            .map(|until| (until - now).num_milliseconds().max(0))
            .unwrap_or(0);

        let live = slot.attempt.filter(|attempt| attempt.is_live(now));
        let attempt_ms_left = live
            .as_ref()
            .map(|attempt| attempt.remaining(now).num_milliseconds().max(0))
            .unwrap_or(0);

        Ok(AttemptStatus {
            cooldown_ms_left: cooldown_ms_left as u64,
            cooldown_hours_left: hours_ceil(cooldown_ms_left),
            attempt_ms_left: attempt_ms_left as u64,
            attempt_seconds_left: ((attempt_ms_left + 999) / 1000) as u64,
            duration_minutes: self.lifecycle.attempt_minutes,
            form_variant: live.as_ref().map(|attempt| attempt.form_variant),
            started_at: live.as_ref().map(|attempt| attempt.started_at),
        })
    }

    /// Close any attempt and open a fresh cooldown.
    ///
    /// Unconditional and idempotent: repeated calls only move the deadline
    /// to `now + cooldown`.
    pub async fn finish(&self, user_id: &UserId) -> Result<FinishReceipt, GateError> {
        let cooldown_until = self
            .lifecycle
            .cooldown_until(self.clock.now())
            .ok_or(GateError::DeadlineOutOfRange)?;
        self.store
            .apply(user_id, SlotWrite::Close { cooldown_until })
            .await?;

        tracing::info!(user = %user_id, %cooldown_until, "Attempt finished, cooldown opened");
        Ok(FinishReceipt {
            cooldown_hours: self.lifecycle.cooldown_hours,
            cooldown_until,
        })
    }

    fn decide(
        &self,
        user_id: &UserId,
        slot: &Slot,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError> {
        if let Some(until) = slot.cooldown_until {
            if now < until {
                return Ok(Decision::Reject {
                    hours_left: hours_ceil((until - now).num_milliseconds()),
                });
            }
        }

        Ok(match &slot.attempt {
            Some(attempt) if attempt.is_live(now) => Decision::Resume(attempt.clone()),
            Some(_) => Decision::CloseStale {
                cooldown_until: self
                    .lifecycle
                    .cooldown_until(now)
                    .ok_or(GateError::DeadlineOutOfRange)?,
            },
            None => Decision::Create(Attempt::new(
                user_id.clone(),
                FormVariant::random(&mut rand::thread_rng()),
                now,
                self.lifecycle.attempt_seconds(),
            )),
        })
    }
}
