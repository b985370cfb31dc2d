//! Client side of the controller's HTTP surface.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::attempt::UserId;
use crate::auth::SESSION_COOKIE;
use crate::controller::AttemptStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Unexpected status {0}")]
    Status(u16),
}

/// What the countdown needs from the controller.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Identity behind the current session.
    async fn user_id(&self) -> Result<UserId, ClientError>;

    async fn status(&self) -> Result<AttemptStatus, ClientError>;

    /// Report that the attempt ended.
    async fn finish(&self) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct UserBody {
    id: UserId,
}

/// [`ControllerClient`] over the gate's JSON API, authenticated by cookie.
pub struct HttpControllerClient {
    base_url: String,
    session_token: String,
    client: reqwest::Client,
}

impl HttpControllerClient {
    pub fn new(
        base_url: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_token: session_token.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn cookie(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.session_token)
    }

    fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        match response.status() {
            s if s.is_success() => Ok(response),
            reqwest::StatusCode::UNAUTHORIZED => Err(ClientError::NotAuthenticated),
            s => Err(ClientError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl ControllerClient for HttpControllerClient {
    async fn user_id(&self) -> Result<UserId, ClientError> {
        let response = self
            .client
            .get(self.url("/api/auth/user"))
            .header(reqwest::header::COOKIE, self.cookie())
            .send()
            .await?;
        let body: UserBody = Self::check(response)?.json().await?;
        Ok(body.id)
    }

    async fn status(&self) -> Result<AttemptStatus, ClientError> {
        let response = self
            .client
            .get(self.url("/api/whitelist/status"))
            .header(reqwest::header::COOKIE, self.cookie())
            .send()
            .await?;
        Ok(Self::check(response)?.json().await?)
    }

    async fn finish(&self) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/whitelist/finish"))
            .header(reqwest::header::COOKIE, self.cookie())
            .send()
            .await?;
        Self::check(response)?;
        Ok(())
    }
}
