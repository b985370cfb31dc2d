//! Eligibility oracle seam.
//!
//! The oracle answers whether a user already qualifies. It is consulted by
//! the controller, never owned by it. Lookup failures must answer `false`
//! so an outage never blocks a legitimate attempt; cooldown and attempt
//! checks still apply afterwards.

pub mod discord;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::attempt::UserId;

pub use discord::DiscordRoleOracle;

#[async_trait]
pub trait EligibilityOracle: Send + Sync {
    /// Whether the user already holds eligibility.
    async fn is_eligible(&self, user_id: &UserId) -> bool;
}

/// Oracle with a fixed set of eligible users.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    eligible: HashSet<UserId>,
}

impl StaticOracle {
    pub fn new<I, U>(eligible: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self {
            eligible: eligible.into_iter().map(Into::into).collect(),
        }
    }

    /// Oracle for which nobody is eligible yet.
    pub fn nobody() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EligibilityOracle for StaticOracle {
    async fn is_eligible(&self, user_id: &UserId) -> bool {
        self.eligible.contains(user_id)
    }
}
