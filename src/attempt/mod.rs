//! Attempt and cooldown domain types.
//!
//! An [`Attempt`] is one user's time-boxed session on an external form. A
//! [`CooldownWindow`] is the period after an attempt ends during which the
//! same user may not start another one.

pub mod error;

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub use error::GateError;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Largest whole-second span a [`Duration`] can hold.
const MAX_DURATION_SECONDS: u64 = (i64::MAX / 1000) as u64;

pub type UrlParseError = <reqwest::Url as std::str::FromStr>::Err;

/// Stable user identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One of the two interchangeable external forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormVariant {
    A,
    B,
}

impl FormVariant {
    pub const ALL: [FormVariant; 2] = [FormVariant::A, FormVariant::B];

    /// Pick a variant uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormVariant::A => "A",
            FormVariant::B => "B",
        }
    }
}

impl fmt::Display for FormVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a form variant lives and which field receives the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTarget {
    pub base_url: String,
    pub id_field: String,
}

impl FormTarget {
    pub fn new(base_url: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            id_field: id_field.into(),
        }
    }

    /// Build the form URL with the user id prefilled.
    pub fn prefilled_url(&self, user_id: &UserId) -> Result<reqwest::Url, UrlParseError> {
        reqwest::Url::parse_with_params(
            &self.base_url,
            &[("usp", "pp_url"), (self.id_field.as_str(), user_id.as_str())],
        )
    }
}

/// A live, time-boxed attempt. At most one exists per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub form_variant: FormVariant,
    pub duration_seconds: u64,
}

impl Attempt {
    pub fn new(
        user_id: UserId,
        form_variant: FormVariant,
        started_at: DateTime<Utc>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            user_id,
            started_at,
            form_variant,
            duration_seconds,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_seconds.min(MAX_DURATION_SECONDS) as i64)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    /// Unpenalized time left, floored at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.duration() - self.elapsed(now)).max(Duration::zero())
    }

    /// Live while less than the full duration has elapsed.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) < self.duration()
    }
}

/// Period after an attempt during which no new attempt may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownWindow {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl CooldownWindow {
    pub fn new(user_id: UserId, expires_at: DateTime<Utc>) -> Self {
        Self { user_id, expires_at }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    pub fn hours_left(&self, now: DateTime<Utc>) -> u64 {
        hours_ceil(self.remaining(now).num_milliseconds())
    }
}

/// Round a millisecond span up to whole hours.
pub fn hours_ceil(ms: i64) -> u64 {
    if ms <= 0 {
        return 0;
    }
    ((ms + MS_PER_HOUR - 1) / MS_PER_HOUR) as u64
}
