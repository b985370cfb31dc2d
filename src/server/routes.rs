//! Axum route handlers for the attempt gate.
//!
//! # Routes
//!
//! - `GET  /health`               — Returns `{"status": "ok", "version": "0.1.0"}`
//! - `POST /api/whitelist/start`  — `{formVariant, startedAt, durationSeconds, resumed, formUrl?}`
//! - `GET  /api/whitelist/status` — [`AttemptStatus`]
//! - `POST /api/whitelist/finish` — `{ok: true, cooldownHours}`
//! - `GET  /api/auth/user`        — `{id}`
//! - `POST /api/auth/logout`      — `{success: true}`
//!
//! Every `/api/whitelist` route requires a session; failures are rendered by
//! the [`GateError`] response mapping.

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::attempt::{FormVariant, GateError};
use crate::auth::{AuthenticatedUser, SessionStore};
use crate::clock::SystemClock;
use crate::config::{FormTargets, GateConfig};
use crate::controller::{AttemptController, AttemptStatus};
use crate::eligibility::DiscordRoleOracle;
use crate::registry::InMemoryRegistry;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Owns the attempt lifecycle and its registry.
    pub controller: Arc<AttemptController>,
    /// Sessions registered by the identity handshake.
    pub sessions: Arc<SessionStore>,
    /// External form targets, used to hand out prefilled URLs.
    pub forms: Arc<FormTargets>,
}

impl AppState {
    pub fn new(
        controller: Arc<AttemptController>,
        sessions: Arc<SessionStore>,
        forms: FormTargets,
    ) -> Self {
        Self {
            controller,
            sessions,
            forms: Arc::new(forms),
        }
    }

    /// Production wiring: in-memory registry, Discord oracle, system clock.
    pub fn from_config(config: &GateConfig) -> Result<Self, reqwest::Error> {
        let oracle = DiscordRoleOracle::new(config.discord.clone())?;
        let controller = AttemptController::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(oracle),
            Arc::new(SystemClock),
            config.lifecycle,
        );
        Ok(Self::new(
            Arc::new(controller),
            Arc::new(SessionStore::new()),
            config.forms.clone(),
        ))
    }
}

impl FromRef<AppState> for Arc<SessionStore> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Body of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub form_variant: FormVariant,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub resumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_url: Option<String>,
}

/// Body of a finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishResponse {
    pub ok: bool,
    pub cooldown_hours: u64,
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/whitelist/start", post(start_handler))
        .route("/api/whitelist/status", get(status_handler))
        .route("/api/whitelist/finish", post(finish_handler))
        .route("/api/auth/user", get(user_handler))
        .route("/api/auth/logout", post(logout_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "whitelist-gate",
    }))
}

/// POST /api/whitelist/start — start a new attempt or resume the live one.
async fn start_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<StartResponse>, GateError> {
    let started = state.controller.start(&auth.user_id).await?;
    let attempt = started.attempt;

    let form_url = state
        .forms
        .get(attempt.form_variant)
        .and_then(|target| match target.prefilled_url(&attempt.user_id) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::warn!(variant = %attempt.form_variant, "Bad form URL: {}", e);
                None
            }
        });

    Ok(Json(StartResponse {
        form_variant: attempt.form_variant,
        started_at: attempt.started_at,
        duration_seconds: attempt.duration_seconds,
        resumed: started.resumed,
        form_url,
    }))
}

/// GET /api/whitelist/status — cooldown and unpenalized attempt time left.
async fn status_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<AttemptStatus>, GateError> {
    Ok(Json(state.controller.status(&auth.user_id).await?))
}

/// POST /api/whitelist/finish — close the attempt. Safe to repeat.
async fn finish_handler(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<FinishResponse>, GateError> {
    let receipt = state.controller.finish(&auth.user_id).await?;
    Ok(Json(FinishResponse {
        ok: true,
        cooldown_hours: receipt.cooldown_hours,
    }))
}

/// GET /api/auth/user — identity behind the session.
async fn user_handler(auth: AuthenticatedUser) -> impl IntoResponse {
    Json(serde_json::json!({ "id": auth.user_id }))
}

/// POST /api/auth/logout — end the session if there is one.
async fn logout_handler(
    State(state): State<AppState>,
    auth: Option<AuthenticatedUser>,
) -> impl IntoResponse {
    if let Some(auth) = auth {
        state.sessions.revoke(&auth.token);
        tracing::info!(user = %auth.user_id, "Logged out");
    }
    Json(serde_json::json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::{FormTarget, UserId};
    use crate::clock::ManualClock;
    use crate::config::LifecycleConfig;
    use crate::eligibility::StaticOracle;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        state: AppState,
        clock: ManualClock,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 20, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(t0());
        let controller = AttemptController::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(StaticOracle::new(["already-in"])),
            Arc::new(clock.clone()),
            LifecycleConfig {
                cooldown_hours: 12,
                attempt_minutes: 25,
            },
        );
        let forms = FormTargets {
            a: Some(FormTarget::new("https://forms.example.com/a", "entry.1")),
            b: Some(FormTarget::new("https://forms.example.com/b", "entry.2")),
        };
        Harness {
            state: AppState::new(Arc::new(controller), Arc::new(SessionStore::new()), forms),
            clock,
        }
    }

    impl Harness {
        fn login(&self, user: &str) -> String {
            self.state.sessions.issue(UserId::new(user))
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
            let request = builder.body(Body::empty()).unwrap();

            let response = app_router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), 4096)
                .await
                .unwrap();
            let json = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body).unwrap()
            };
            (status, json)
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let h = harness();
        let (status, json) = h.call("GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "whitelist-gate");
    }

    #[tokio::test]
    async fn test_routes_require_session() {
        let h = harness();

        for (method, uri) in [
            ("POST", "/api/whitelist/start"),
            ("GET", "/api/whitelist/status"),
            ("POST", "/api/whitelist/finish"),
            ("GET", "/api/auth/user"),
        ] {
            let (status, json) = h.call(method, uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(json["error"], "not_authenticated");

            let (status, _) = h.call(method, uri, Some("forged")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_start_then_resume() {
        let h = harness();
        let token = h.login("player-1");

        let (status, first) = h.call("POST", "/api/whitelist/start", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["startedAt"], t0().timestamp_millis());
        assert_eq!(first["durationSeconds"], 1500);
        assert_eq!(first["resumed"], false);
        let variant = first["formVariant"].as_str().unwrap().to_string();
        assert!(variant == "A" || variant == "B");
        assert!(first["formUrl"]
            .as_str()
            .unwrap()
            .ends_with("usp=pp_url&entry.1=player-1")
            || first["formUrl"]
                .as_str()
                .unwrap()
                .ends_with("usp=pp_url&entry.2=player-1"));

        h.clock.advance(Duration::minutes(5));
        let (status, second) = h.call("POST", "/api/whitelist/start", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["resumed"], true);
        assert_eq!(second["startedAt"], first["startedAt"]);
        assert_eq!(second["formVariant"], first["formVariant"]);
    }

    #[tokio::test]
    async fn test_start_already_eligible_is_conflict() {
        let h = harness();
        let token = h.login("already-in");

        let (status, json) = h.call("POST", "/api/whitelist/start", Some(&token)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "already_eligible");
    }

    #[tokio::test]
    async fn test_expiry_finish_and_cooldown() {
        let h = harness();
        let token = h.login("player-2");

        h.call("POST", "/api/whitelist/start", Some(&token)).await;
        h.clock.advance(Duration::minutes(26));

        let (status, json) = h.call("POST", "/api/whitelist/finish", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"ok": true, "cooldownHours": 12}));

        let (status, json) = h.call("GET", "/api/whitelist/status", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["attemptMsLeft"], 0);
        assert_eq!(json["attemptSecondsLeft"], 0);
        assert_eq!(json["formVariant"], Value::Null);
        assert_eq!(json["startedAt"], Value::Null);
        assert_eq!(json["cooldownHoursLeft"], 12);
        assert_eq!(json["cooldownMsLeft"], 12 * 60 * 60 * 1000);
        assert_eq!(json["durationMinutes"], 25);

        let (status, json) = h.call("POST", "/api/whitelist/start", Some(&token)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "cooldown");
        assert_eq!(json["hoursLeft"], 12);
    }

    #[tokio::test]
    async fn test_status_reports_live_attempt() {
        let h = harness();
        let token = h.login("player-3");

        let (_, started) = h.call("POST", "/api/whitelist/start", Some(&token)).await;
        h.clock.advance(Duration::minutes(10));

        let (status, json) = h.call("GET", "/api/whitelist/status", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["attemptMsLeft"], 15 * 60 * 1000);
        assert_eq!(json["attemptSecondsLeft"], 15 * 60);
        assert_eq!(json["formVariant"], started["formVariant"]);
        assert_eq!(json["startedAt"], started["startedAt"]);
        assert_eq!(json["cooldownMsLeft"], 0);

        let parsed: AttemptStatus = serde_json::from_value(json).unwrap();
        assert!(parsed.has_live_attempt());
    }

    #[tokio::test]
    async fn test_user_and_logout() {
        let h = harness();
        let token = h.login("player-4");

        let (status, json) = h.call("GET", "/api/auth/user", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "player-4");

        let (status, json) = h.call("POST", "/api/auth/logout", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        let (status, _) = h.call("GET", "/api/auth/user", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Logging out without a session is harmless.
        let (status, _) = h.call("POST", "/api/auth/logout", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
