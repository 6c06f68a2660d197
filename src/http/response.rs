//! Mapping of admission outcomes and errors onto HTTP responses.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::GateError;
use crate::identity::recommendations;
use crate::ratelimit::RateLimitDecision;

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            GateError::FormatInvalid(invalid) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid_device_id",
                    "message": invalid.to_string(),
                    "rule": invalid.rule(),
                    "recommendations": recommendations(),
                })),
            )
                .into_response(),
            GateError::RequiredIdentityMissing { accepted_headers } => {
                identity_required(&accepted_headers)
            }
            other => {
                error!(error = %other, "Request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal_error",
                        "message": "An internal error occurred",
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// 400 response naming the headers a device id is accepted in.
pub fn identity_required(accepted_headers: &[String]) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "device_id_required",
            "message": format!(
                "A valid device id is required. Send it in one of these headers: {}",
                accepted_headers.join(", ")
            ),
            "acceptedHeaders": accepted_headers,
            "recommendations": recommendations(),
        })),
    )
        .into_response()
}

/// 429 response for a denied decision, quota headers included.
pub fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let mut response = match decision.denial_body() {
        Some(body) => (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response(),
        None => StatusCode::TOO_MANY_REQUESTS.into_response(),
    };

    let headers = response.headers_mut();
    decision.apply_headers(headers);
    if let Some(retry_after) = decision.retry_after_seconds {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    }
    response
}
