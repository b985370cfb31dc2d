//! Client-side countdown for a live attempt.
//!
//! The countdown renders the server's attempt, deducts a fixed penalty each
//! time the page is hidden, and reports `finish` exactly once when the time
//! runs out, the user exits, or the page goes away.
//!
//! - [`timer`]: the pure countdown state machine
//! - [`ledger`]: per-attempt penalty storage
//! - [`client`]: the controller's HTTP API as seen by the countdown
//! - [`session`]: the tokio task tying them together

pub mod client;
pub mod ledger;
pub mod session;
pub mod timer;

pub use client::{ClientError, ControllerClient, HttpControllerClient};
pub use ledger::{FileLedgerStore, LedgerError, LedgerKey, LedgerStore, MemoryLedgerStore, PenaltyLedger};
pub use session::{CountdownSession, CountdownView, SessionError, SessionEvent, SessionHandle};
pub use timer::{format_clock, CountdownTimer, Termination, TerminationReason, Visibility, PENALTY_SECONDS};
