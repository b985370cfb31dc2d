//! Session lookup for authenticated requests.
//!
//! The identity-provider handshake runs elsewhere; once it has verified a
//! user it registers a session here with [`SessionStore::issue`]. Requests
//! then carry the session token either as `Authorization: Bearer <token>` or
//! in the `wl_session` cookie.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use dashmap::DashMap;
use uuid::Uuid;

use crate::attempt::{GateError, UserId};

pub const SESSION_COOKIE: &str = "wl_session";

/// Session token → verified user.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, UserId>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a verified user and return its token.
    pub fn issue(&self, user_id: UserId) -> String {
        let token = Uuid::new_v4().to_string();
        tracing::debug!(user = %user_id, "Session issued");
        self.sessions.insert(token.clone(), user_id);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<UserId> {
        self.sessions.get(token).map(|user| user.clone())
    }

    /// End a session. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) -> Option<UserId> {
        self.sessions.remove(token).map(|(_, user)| user)
    }
}

/// Pull the session token out of the request headers.
pub fn session_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

/// Extractor for a request with a verified identity.
///
/// Rejects with [`GateError::NotAuthenticated`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<SessionStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = Arc::<SessionStore>::from_ref(state);
        let token = session_token(parts).ok_or(GateError::NotAuthenticated)?;
        let user_id = sessions
            .resolve(&token)
            .ok_or(GateError::NotAuthenticated)?;
        Ok(Self { user_id, token })
    }
}
