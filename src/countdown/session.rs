//! Countdown session driver.
//!
//! Runs one [`CountdownTimer`] on a single task: a periodic tick and the
//! page events arrive through one `select!`, so no two inputs ever overlap.
//! The view is published on a `watch` channel. When the timer terminates
//! the session reports `finish` once, best effort, and the task ends.
//!
//! Dropping every event sender counts as page teardown.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::client::{ClientError, ControllerClient};
use super::ledger::{LedgerError, LedgerKey, LedgerStore, PenaltyLedger};
use super::timer::{CountdownTimer, Termination, TerminationReason, Visibility};
use crate::attempt::{FormVariant, UserId};
use crate::clock::Clock;

pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The server has no live attempt; send the user back to the instructions.
    #[error("No live attempt for this session")]
    NoLiveAttempt,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Hidden,
    Visible,
    Exit,
    Teardown,
}

impl SessionEvent {
    /// Parse a one-word page command: `hide`, `show`, `exit` or `close`.
    pub fn from_command(command: &str) -> Option<Self> {
        match command.trim() {
            "hide" => Some(SessionEvent::Hidden),
            "show" => Some(SessionEvent::Visible),
            "exit" => Some(SessionEvent::Exit),
            "close" => Some(SessionEvent::Teardown),
            _ => None,
        }
    }
}

/// What the countdown view renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownView {
    pub user_id: UserId,
    pub form_variant: FormVariant,
    pub remaining_seconds: u64,
    pub penalty_seconds: u64,
    pub ended: Option<TerminationReason>,
}

impl CountdownView {
    pub fn clock_text(&self) -> String {
        super::timer::format_clock(self.remaining_seconds)
    }

    pub fn is_over(&self) -> bool {
        self.ended.is_some()
    }
}

/// Builder for a running countdown.
pub struct CountdownSession {
    client: Arc<dyn ControllerClient>,
    ledgers: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    tick_interval: StdDuration,
}

/// Handle to a running countdown task.
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    view: watch::Receiver<CountdownView>,
    task: JoinHandle<Termination>,
}

impl SessionHandle {
    pub fn view(&self) -> watch::Receiver<CountdownView> {
        self.view.clone()
    }

    /// Forward a page event. Events after termination are dropped.
    pub async fn send(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!(?event, "Countdown already ended, event dropped");
        }
    }

    pub async fn hide(&self) {
        self.send(SessionEvent::Hidden).await;
    }

    pub async fn show(&self) {
        self.send(SessionEvent::Visible).await;
    }

    pub async fn exit(&self) {
        self.send(SessionEvent::Exit).await;
    }

    /// Tear the countdown down and wait for the task to end.
    pub async fn finished(self) -> Result<Termination, tokio::task::JoinError> {
        let Self { events, task, .. } = self;
        drop(events);
        task.await
    }

    /// Wait for the countdown to end without tearing it down.
    pub async fn join(self) -> Result<Termination, tokio::task::JoinError> {
        let Self { events, task, .. } = self;
        let result = task.await;
        drop(events);
        result
    }
}

impl CountdownSession {
    pub fn new(
        client: Arc<dyn ControllerClient>,
        ledgers: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            ledgers,
            clock,
            tick_interval: TICK_INTERVAL,
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: StdDuration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Fetch the server snapshot and start ticking.
    ///
    /// Fails with [`SessionError::NoLiveAttempt`] when the server reports no
    /// attempt in progress; no countdown is rendered without one.
    pub async fn start(self) -> Result<SessionHandle, SessionError> {
        let user_id = self.client.user_id().await?;
        let status = self.client.status().await?;
        let local_now = self.clock.now();

        let (Some(started_at), Some(form_variant)) = (status.started_at, status.form_variant)
        else {
            tracing::info!(user = %user_id, "No live attempt, countdown not started");
            return Err(SessionError::NoLiveAttempt);
        };
        let duration_seconds = status.duration_minutes.saturating_mul(60);

        // Map local time onto server time using the server's own remaining figure.
        let skew = i64::try_from(duration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|duration| started_at.checked_add_signed(duration))
            .and_then(|ends_at| {
                let left = i64::try_from(status.attempt_ms_left).ok()?;
                ends_at.checked_sub_signed(Duration::try_milliseconds(left)?)
            })
            .map(|server_now| server_now - local_now)
            .unwrap_or_else(|| {
                tracing::warn!("Server snapshot out of range, using the local clock");
                Duration::zero()
            });

        let key = LedgerKey::new(user_id.clone(), form_variant);
        let ledger = PenaltyLedger::adopt(self.ledgers.load(&key)?, started_at);

        let mut timer = CountdownTimer::new(started_at, duration_seconds, ledger.penalty_seconds);
        timer.tick(local_now + skew);

        let (view_tx, view_rx) = watch::channel(CountdownView {
            user_id: user_id.clone(),
            form_variant,
            remaining_seconds: timer.remaining_seconds(),
            penalty_seconds: timer.penalty_seconds(),
            ended: None,
        });
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        tracing::info!(
            user = %user_id,
            variant = %form_variant,
            remaining = timer.remaining_seconds(),
            penalty = ledger.penalty_seconds,
            "Countdown started"
        );

        let runner = Runner {
            client: self.client,
            ledgers: self.ledgers,
            clock: self.clock,
            skew,
            key,
            ledger,
            timer,
            view: view_tx,
        };
        let task = tokio::spawn(runner.run(events_rx, self.tick_interval));

        Ok(SessionHandle {
            events: events_tx,
            view: view_rx,
            task,
        })
    }
}

struct Runner {
    client: Arc<dyn ControllerClient>,
    ledgers: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    key: LedgerKey,
    ledger: PenaltyLedger,
    timer: CountdownTimer,
    view: watch::Sender<CountdownView>,
}

impl Runner {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now() + self.skew
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        tick_interval: StdDuration,
    ) -> Termination {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // A snapshot that was already over at startup skips the loop.
        let termination = match self.timer.termination() {
            Some(done) => done,
            None => loop {
                let step = tokio::select! {
                    _ = ticker.tick() => {
                        let now = self.now();
                        self.timer.tick(now)
                    }
                    event = events.recv() => {
                        let now = self.now();
                        match event {
                            Some(SessionEvent::Hidden) => self.timer.visibility_changed(Visibility::Hidden, now),
                            Some(SessionEvent::Visible) => self.timer.visibility_changed(Visibility::Visible, now),
                            Some(SessionEvent::Exit) => self.timer.exit(now),
                            Some(SessionEvent::Teardown) | None => self.timer.teardown(now),
                        }
                    }
                };
                self.persist_penalty();
                self.publish();
                if let Some(done) = step {
                    break done;
                }
            },
        };

        self.publish();
        self.report(termination).await;
        termination
    }

    fn persist_penalty(&mut self) {
        if self.timer.penalty_seconds() == self.ledger.penalty_seconds {
            return;
        }
        self.ledger.penalty_seconds = self.timer.penalty_seconds();
        if let Err(e) = self.ledgers.save(&self.key, &self.ledger) {
            tracing::warn!("Failed to persist penalty ledger: {}", e);
        }
    }

    fn publish(&self) {
        self.view.send_modify(|view| {
            view.remaining_seconds = self.timer.remaining_seconds();
            view.penalty_seconds = self.timer.penalty_seconds();
            view.ended = self.timer.termination().map(|t| t.reason);
        });
    }

    async fn report(&self, termination: Termination) {
        tracing::info!(
            user = %self.key.user_id,
            reason = ?termination.reason,
            "Countdown ended, reporting finish"
        );
        if let Err(e) = self.client.finish().await {
            tracing::warn!(user = %self.key.user_id, "Finish not delivered: {}", e);
        }
    }
}
