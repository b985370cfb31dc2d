//! # whitelist-gate
//!
//! Gate for a timed whitelist application form.
//!
//! Each user gets one attempt at a time: starting an attempt assigns one of two
//! interchangeable forms and a fixed time budget, and finishing it (on submit,
//! exit, or expiry) opens a cooldown before the next attempt is allowed.
//! Users already holding the whitelist role are turned away up front.
//!
//! The server side is the [`controller::AttemptController`] behind an axum
//! router ([`server`]). The client side is a countdown ([`countdown`]) that
//! syncs to the server's clock and deducts a penalty whenever the page is
//! hidden.

pub mod attempt;
pub mod auth;
pub mod clock;
pub mod config;
pub mod controller;
pub mod countdown;
pub mod eligibility;
pub mod registry;
pub mod server;

pub use attempt::{Attempt, CooldownWindow, FormTarget, FormVariant, GateError, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GateConfig;
pub use controller::{AttemptController, AttemptStatus};
pub use registry::{AttemptStore, InMemoryRegistry};

/// Crate version reported by `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
