//! Device identity endpoints.

use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::middleware::peer_ip;
use super::AppState;
use crate::identity::RequestContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub device_id: String,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "devicegate" }))
}

/// `POST /api/device/generate` issues a bootstrap device id.
pub async fn generate_device_id(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.admin.bootstrap())
}

/// `POST /api/device/validate` reports whether an id would be accepted.
pub async fn validate_device_id(
    State(state): State<AppState>,
    Json(body): Json<ValidateRequest>,
) -> impl IntoResponse {
    Json(state.admin.validate(&body.device_id))
}

/// `GET /api/device/info` shows how the current request was identified.
pub async fn device_info(State(state): State<AppState>, request: Request) -> impl IntoResponse {
    let ctx = RequestContext::new(request.headers(), peer_ip(request.extensions()));
    let identity = state.policy.identify(&ctx);
    let key = state.policy.derive_key(&ctx).ok();

    Json(json!({
        "identity": identity,
        "rateLimitKey": key.as_ref().map(|k| k.to_string()),
        "rateLimitScope": key.as_ref().map(|k| k.scope().as_str()),
    }))
}

/// `GET /api/device/rate-limit-status` shows the quota of the current request's identity.
pub async fn rate_limit_status(State(state): State<AppState>, request: Request) -> Response {
    let ctx = RequestContext::new(request.headers(), peer_ip(request.extensions()));
    match state.policy.status(&ctx) {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Check the `Authorization: Bearer` header against the configured admin token.
///
/// Returns the response to send when the caller is not allowed through.
fn require_admin(state: &AppState, headers: &HeaderMap, device_id: &str) -> Option<Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!("Admin endpoint requested but no admin token is configured");
        return Some(
            (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "admin_disabled",
                    "message": "Device administration is not enabled on this server",
                })),
            )
                .into_response(),
        );
    };

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected) {
        warn!(device_id = %device_id, "Rejected admin request with missing or wrong token");
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "unauthorized",
                    "message": "A valid admin token is required",
                })),
            )
                .into_response(),
        );
    }

    None
}

/// `GET /api/device/{device_id}/status` reports a device's quota. Requires the admin token.
pub async fn device_status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, &device_id) {
        return denied;
    }

    match state.admin.device_status(&device_id) {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /api/device/{device_id}/reset` clears a device's quota. Requires the admin token.
pub async fn reset_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, &device_id) {
        return denied;
    }

    match state.admin.reset_device(&device_id) {
        Ok(()) => {
            info!(device_id = %device_id, "Device quota reset via API");
            Json(json!({ "deviceId": device_id, "reset": true })).into_response()
        }
        Err(e) => e.into_response(),
    }
}
