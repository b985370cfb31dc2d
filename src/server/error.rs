use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::attempt::GateError;

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            GateError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "not_authenticated"}),
            ),
            GateError::AlreadyEligible => {
                (StatusCode::CONFLICT, json!({"error": "already_eligible"}))
            }
            GateError::Cooldown { hours_left } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({"error": "cooldown", "hoursLeft": hours_left}),
            ),
            GateError::DeadlineOutOfRange => {
                tracing::error!("Cooldown deadline out of range, check WL_COOLDOWN_HOURS");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal"}),
                )
            }
            GateError::Store(e) => {
                tracing::error!("Registry failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "internal"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
