//! Countdown state machine.
//!
//! Pure and clock-free: every input carries the instant it happened at, so
//! the same machine runs under a real 1 s interval or a manual clock.
//!
//! `remaining = duration - floor(elapsed) - penalty`. Exactly one
//! [`Termination`] is ever produced, by whichever of expiry, exit or
//! teardown comes first; after that the machine ignores further input.

use chrono::{DateTime, Utc};

/// Seconds deducted for each visible → hidden transition.
pub const PENALTY_SECONDS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Remaining time reached zero, naturally or through a penalty.
    Expired,
    /// The user left on purpose.
    Exited,
    /// The page was closed or navigated away.
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Termination {
    pub reason: TerminationReason,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CountdownTimer {
    started_at: DateTime<Utc>,
    duration_seconds: u64,
    penalty_seconds: u64,
    visibility: Visibility,
    remaining_seconds: u64,
    termination: Option<Termination>,
}

impl CountdownTimer {
    /// A timer for an attempt, seeded with any penalty already on the ledger.
    pub fn new(started_at: DateTime<Utc>, duration_seconds: u64, penalty_seconds: u64) -> Self {
        let remaining_seconds = duration_seconds.saturating_sub(penalty_seconds);
        Self {
            started_at,
            duration_seconds,
            penalty_seconds,
            visibility: Visibility::Visible,
            remaining_seconds,
            termination: None,
        }
    }

    pub fn penalty_seconds(&self) -> u64 {
        self.penalty_seconds
    }

    /// Remaining seconds as of the last input, clamped at zero.
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// `MM:SS` for the last computed remaining time.
    pub fn clock_text(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    fn remaining_at(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now - self.started_at).num_seconds().max(0);
        self.duration_seconds as i64 - elapsed - self.penalty_seconds as i64
    }

    /// Recompute at `now`; on reaching zero this terminates as expired.
    fn refresh(&mut self, now: DateTime<Utc>) -> Option<Termination> {
        let remaining = self.remaining_at(now);
        if remaining <= 0 {
            self.remaining_seconds = 0;
            return self.terminate(TerminationReason::Expired, now);
        }
        self.remaining_seconds = remaining as u64;
        None
    }

    /// Periodic tick.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Termination> {
        if self.is_terminated() {
            return None;
        }
        self.refresh(now)
    }

    /// Visibility change. Only a visible → hidden edge costs a penalty.
    pub fn visibility_changed(
        &mut self,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Option<Termination> {
        if self.is_terminated() {
            return None;
        }

        let previous = std::mem::replace(&mut self.visibility, visibility);
        if previous == Visibility::Visible && visibility == Visibility::Hidden {
            if let Some(done) = self.refresh(now) {
                return Some(done);
            }
            self.penalty_seconds += PENALTY_SECONDS;
            tracing::debug!(penalty = self.penalty_seconds, "Tab hidden, penalty applied");
            return self.refresh(now);
        }
        None
    }

    /// The user chose to leave.
    pub fn exit(&mut self, now: DateTime<Utc>) -> Option<Termination> {
        self.terminate(TerminationReason::Exited, now)
    }

    /// The page is going away.
    pub fn teardown(&mut self, now: DateTime<Utc>) -> Option<Termination> {
        self.terminate(TerminationReason::TornDown, now)
    }

    fn terminate(&mut self, reason: TerminationReason, now: DateTime<Utc>) -> Option<Termination> {
        if self.termination.is_some() {
            return None;
        }
        let termination = Termination { reason, at: now };
        self.termination = Some(termination);
        Some(termination)
    }
}

/// Render seconds as zero-padded `MM:SS`.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap()
    }

    fn timer() -> CountdownTimer {
        CountdownTimer::new(t0(), 25 * 60, 0)
    }

    #[test]
    fn test_tick_counts_down() {
        let mut timer = timer();

        assert_eq!(timer.tick(t0()), None);
        assert_eq!(timer.remaining_seconds(), 1500);

        assert_eq!(timer.tick(t0() + Duration::milliseconds(61_900)), None);
        assert_eq!(timer.remaining_seconds(), 1500 - 61);
        assert_eq!(timer.clock_text(), "23:59");
    }

    #[test]
    fn test_hide_penalizes_once_per_transition() {
        let mut timer = timer();
        let at = t0() + Duration::minutes(15);
        timer.tick(at);
        assert_eq!(timer.remaining_seconds(), 600);

        assert_eq!(timer.visibility_changed(Visibility::Hidden, at), None);
        assert_eq!(timer.remaining_seconds(), 300);
        assert_eq!(timer.penalty_seconds(), 300);

        // Still hidden: no second penalty.
        assert_eq!(timer.visibility_changed(Visibility::Hidden, at), None);
        assert_eq!(timer.remaining_seconds(), 300);

        timer.visibility_changed(Visibility::Visible, at);
        assert_eq!(timer.remaining_seconds(), 300);

        timer.visibility_changed(Visibility::Hidden, at + Duration::seconds(10));
        assert_eq!(timer.penalty_seconds(), 600);
        assert_eq!(timer.remaining_seconds(), 0);
        assert!(timer.is_terminated());
    }

    #[test]
    fn test_penalty_can_expire_attempt() {
        let mut timer = timer();
        let at = t0() + Duration::minutes(22);

        let done = timer.visibility_changed(Visibility::Hidden, at).unwrap();

        assert_eq!(done.reason, TerminationReason::Expired);
        assert_eq!(done.at, at);
        assert_eq!(timer.remaining_seconds(), 0);
        assert_eq!(timer.clock_text(), "00:00");
    }

    #[test]
    fn test_expiry_fires_once() {
        let mut timer = timer();

        let done = timer.tick(t0() + Duration::minutes(25)).unwrap();
        assert_eq!(done.reason, TerminationReason::Expired);

        assert_eq!(timer.tick(t0() + Duration::minutes(26)), None);
        assert_eq!(timer.exit(t0() + Duration::minutes(26)), None);
        assert_eq!(timer.teardown(t0() + Duration::minutes(26)), None);
        assert_eq!(timer.termination(), Some(done));
    }

    #[test]
    fn test_exit_stops_everything() {
        let mut timer = timer();
        timer.tick(t0() + Duration::minutes(1));

        let done = timer.exit(t0() + Duration::minutes(2)).unwrap();
        assert_eq!(done.reason, TerminationReason::Exited);

        let before = timer.remaining_seconds();
        assert_eq!(
            timer.visibility_changed(Visibility::Hidden, t0() + Duration::minutes(3)),
            None
        );
        assert_eq!(timer.tick(t0() + Duration::minutes(30)), None);
        assert_eq!(timer.remaining_seconds(), before);
        assert_eq!(timer.penalty_seconds(), 0);
    }

    #[test]
    fn test_hidden_after_expiry_adds_no_penalty() {
        let mut timer = timer();
        let late = t0() + Duration::minutes(40);

        let done = timer.visibility_changed(Visibility::Hidden, late).unwrap();
        assert_eq!(done.reason, TerminationReason::Expired);
        assert_eq!(timer.penalty_seconds(), 0);
    }

    #[test]
    fn test_existing_penalty_is_respected() {
        let mut timer = CountdownTimer::new(t0(), 25 * 60, 600);
        timer.tick(t0() + Duration::minutes(5));
        assert_eq!(timer.remaining_seconds(), 600);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(6001), "100:01");
    }
}
