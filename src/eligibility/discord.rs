//! Guild-role eligibility lookup against the Discord REST API.
//!
//! A user is eligible when their guild member record carries the whitelist
//! role. Every failure path (not a member, non-2xx, transport error, bad
//! body, missing credentials) is logged and answered `false`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::EligibilityOracle;
use crate::attempt::UserId;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Connection settings for [`DiscordRoleOracle`].
#[derive(Debug, Clone)]
pub struct DiscordOracleConfig {
    pub api_base: String,
    pub bot_token: Option<String>,
    pub guild_id: String,
    pub role_id: String,
    pub timeout_ms: u64,
}

impl Default for DiscordOracleConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: None,
            guild_id: String::new(),
            role_id: String::new(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

pub struct DiscordRoleOracle {
    config: DiscordOracleConfig,
    client: reqwest::Client,
}

impl DiscordRoleOracle {
    pub fn new(config: DiscordOracleConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    fn member_url(&self, user_id: &UserId) -> String {
        format!(
            "{}/guilds/{}/members/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.guild_id,
            user_id
        )
    }

    async fn fetch_roles(&self, user_id: &UserId) -> Option<Vec<String>> {
        let Some(token) = self.config.bot_token.as_deref() else {
            tracing::warn!("Discord bot token not configured, treating {} as not eligible", user_id);
            return None;
        };

        let response = match self
            .client
            .get(self.member_url(user_id))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", token))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(user = %user_id, "Discord member lookup failed: {}", e);
                return None;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(user = %user_id, "User is not a guild member");
            return None;
        }
        if !status.is_success() {
            tracing::error!(user = %user_id, %status, "Discord member lookup rejected");
            return None;
        }

        match response.json::<GuildMember>().await {
            Ok(member) => Some(member.roles),
            Err(e) => {
                tracing::error!(user = %user_id, "Invalid guild member payload: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl EligibilityOracle for DiscordRoleOracle {
    async fn is_eligible(&self, user_id: &UserId) -> bool {
        let eligible = self
            .fetch_roles(user_id)
            .await
            .map(|roles| roles.iter().any(|r| r == &self.config.role_id))
            .unwrap_or(false);
        tracing::debug!(user = %user_id, eligible, "Eligibility lookup");
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };

    async fn member_handler(
        Path((guild, user)): Path<(String, String)>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bot secret") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if guild != "guild-1" {
            return StatusCode::NOT_FOUND.into_response();
        }
        match user.as_str() {
            "whitelisted" => Json(serde_json::json!({"roles": ["wl-role", "other"]})).into_response(),
            "member" => Json(serde_json::json!({"roles": ["other"]})).into_response(),
            "broken" => (StatusCode::OK, "not json").into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn spawn_fake_discord() -> String {
        let app = Router::new().route("/guilds/:guild/members/:user", get(member_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn oracle(api_base: String, token: Option<&str>) -> DiscordRoleOracle {
        DiscordRoleOracle::new(DiscordOracleConfig {
            api_base,
            bot_token: token.map(String::from),
            guild_id: "guild-1".to_string(),
            role_id: "wl-role".to_string(),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_role_holder_is_eligible() {
        let base = spawn_fake_discord().await;
        let oracle = oracle(base, Some("secret"));

        assert!(oracle.is_eligible(&UserId::new("whitelisted")).await);
        assert!(!oracle.is_eligible(&UserId::new("member")).await);
    }

    #[tokio::test]
    async fn test_failures_fail_closed() {
        let base = spawn_fake_discord().await;

        let good = oracle(base.clone(), Some("secret"));
        assert!(!good.is_eligible(&UserId::new("stranger")).await);
        assert!(!good.is_eligible(&UserId::new("broken")).await);

        let bad_token = oracle(base.clone(), Some("wrong"));
        assert!(!bad_token.is_eligible(&UserId::new("whitelisted")).await);

        let no_token = oracle(base, None);
        assert!(!no_token.is_eligible(&UserId::new("whitelisted")).await);
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_closed() {
        let oracle = oracle("http://127.0.0.1:1".to_string(), Some("secret"));
        assert!(!oracle.is_eligible(&UserId::new("whitelisted")).await);
    }
}
