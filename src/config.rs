//! Process configuration, read once at start-up.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 10000)
//! - `WL_COOLDOWN_HOURS` — cooldown after an attempt ends (default: 12)
//! - `WL_ATTEMPT_MINUTES` — length of one attempt (default: 25)
//! - `DISCORD_API_BASE` — Discord REST base URL
//! - `DISCORD_BOT_TOKEN` — bot token for the guild member lookup
//! - `DISCORD_GUILD_ID` / `DISCORD_GUILD` — guild to inspect
//! - `DISCORD_WL_ROLE_ID` / `DISCORD_WL_ROLE` — role that marks a user eligible
//! - `WL_FORM_A_URL`, `WL_FORM_A_FIELD`, `WL_FORM_B_URL`, `WL_FORM_B_FIELD` —
//!   external form targets for the two variants

use std::{env, fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::attempt::{FormTarget, FormVariant};
use crate::eligibility::discord::{DiscordOracleConfig, DEFAULT_API_BASE};

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_COOLDOWN_HOURS: u64 = 12;
pub const DEFAULT_ATTEMPT_MINUTES: u64 = 25;

/// Upper bounds for the lifecycle knobs: ten years of cooldown, one day per attempt.
pub const MAX_COOLDOWN_HOURS: u64 = 10 * 365 * 24;
pub const MAX_ATTEMPT_MINUTES: u64 = 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Durations that drive the attempt lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub cooldown_hours: u64,
    pub attempt_minutes: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: DEFAULT_COOLDOWN_HOURS,
            attempt_minutes: DEFAULT_ATTEMPT_MINUTES,
        }
    }
}

impl LifecycleConfig {
    /// Cooldown length, or `None` if it does not fit a [`Duration`].
    pub fn cooldown(&self) -> Option<Duration> {
        i64::try_from(self.cooldown_hours)
            .ok()
            .and_then(Duration::try_hours)
    }

    /// Cooldown deadline for an attempt closed at `now`.
    pub fn cooldown_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cooldown()
            .and_then(|cooldown| now.checked_add_signed(cooldown))
    }

    pub fn attempt_seconds(&self) -> u64 {
        self.attempt_minutes.saturating_mul(60)
    }

    /// Reject values outside the supported ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_hours > MAX_COOLDOWN_HOURS || self.cooldown().is_none() {
            return Err(ConfigError::Invalid {
                key: "WL_COOLDOWN_HOURS".to_string(),
                value: self.cooldown_hours.to_string(),
                reason: format!("must be at most {MAX_COOLDOWN_HOURS}"),
            });
        }
        if self.attempt_minutes == 0 || self.attempt_minutes > MAX_ATTEMPT_MINUTES {
            return Err(ConfigError::Invalid {
                key: "WL_ATTEMPT_MINUTES".to_string(),
                value: self.attempt_minutes.to_string(),
                reason: format!("must be between 1 and {MAX_ATTEMPT_MINUTES}"),
            });
        }
        Ok(())
    }
}

/// Form targets per variant. Either may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormTargets {
    pub a: Option<FormTarget>,
    pub b: Option<FormTarget>,
}

impl FormTargets {
    pub fn get(&self, variant: FormVariant) -> Option<&FormTarget> {
        match variant {
            FormVariant::A => self.a.as_ref(),
            FormVariant::B => self.b.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub port: u16,
    pub lifecycle: LifecycleConfig,
    pub discord: DiscordOracleConfig,
    pub forms: FormTargets,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            lifecycle: LifecycleConfig::default(),
            discord: DiscordOracleConfig::default(),
            forms: FormTargets::default(),
        }
    }
}

impl GateConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|&key| lookup(key));

        let lifecycle = LifecycleConfig {
            cooldown_hours: parse_or(&lookup, "WL_COOLDOWN_HOURS", DEFAULT_COOLDOWN_HOURS)?,
            attempt_minutes: parse_or(&lookup, "WL_ATTEMPT_MINUTES", DEFAULT_ATTEMPT_MINUTES)?,
        };
        lifecycle.validate()?;

        let discord = DiscordOracleConfig {
            api_base: lookup("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            bot_token: lookup("DISCORD_BOT_TOKEN").filter(|t| !t.is_empty()),
            guild_id: first(&["DISCORD_GUILD_ID", "DISCORD_GUILD"]).unwrap_or_default(),
            role_id: first(&["DISCORD_WL_ROLE_ID", "DISCORD_WL_ROLE"]).unwrap_or_default(),
            ..DiscordOracleConfig::default()
        };
        if discord.bot_token.is_none() {
            tracing::warn!("DISCORD_BOT_TOKEN not set, every eligibility lookup will answer no");
        }

        let form = |url_key: &str, field_key: &str| match (lookup(url_key), lookup(field_key)) {
            (Some(url), Some(field)) => Some(FormTarget::new(url, field)),
            _ => None,
        };

        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            lifecycle,
            discord,
            forms: FormTargets {
                a: form("WL_FORM_A_URL", "WL_FORM_A_FIELD"),
                b: form("WL_FORM_B_URL", "WL_FORM_B_FIELD"),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            tracing::info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
