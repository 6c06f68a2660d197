//! HTTP surface: admission middleware and device endpoints.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, not rate limited |
//! | `POST` | `/api/device/generate` | Issue a bootstrap device id |
//! | `POST` | `/api/device/validate` | Validate a device id |
//! | `GET`  | `/api/device/info` | Identity resolved for this request |
//! | `GET`  | `/api/device/rate-limit-status` | Quota of this request's identity |
//! | `GET`  | `/api/device/{device_id}/status` | Quota of a given device (admin token) |
//! | `POST` | `/api/device/{device_id}/reset` | Reset a device's quota (admin token) |

mod handlers;
mod middleware;
mod response;
mod server;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::admin::AdminInterface;
use crate::ratelimit::AdmissionPolicy;

pub use middleware::enforce_admission;
pub use response::{identity_required, too_many_requests};
pub use server::HttpServer;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AdmissionPolicy>,
    pub admin: Arc<AdminInterface>,
    /// Bearer token guarding the reset endpoint
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        policy: Arc<AdmissionPolicy>,
        admin: Arc<AdminInterface>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            policy,
            admin,
            admin_token: admin_token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }
}

/// Build the router. Every route except `/health` passes admission control.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/device/generate", post(handlers::generate_device_id))
        .route("/api/device/validate", post(handlers::validate_device_id))
        .route("/api/device/info", get(handlers::device_info))
        .route(
            "/api/device/rate-limit-status",
            get(handlers::rate_limit_status),
        )
        .route("/api/device/{device_id}/status", get(handlers::device_status))
        .route("/api/device/{device_id}/reset", post(handlers::reset_device))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            enforce_admission,
        ))
        .route("/health", get(handlers::health))
        .with_state(state)
}
