//! Admission enforcement for every routed request.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::Extensions;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, instrument, warn};

use super::response::{identity_required, too_many_requests};
use super::AppState;
use crate::error::GateError;
use crate::identity::RequestContext;

/// Socket peer address recorded by `into_make_service_with_connect_info`.
pub(crate) fn peer_ip(extensions: &Extensions) -> Option<IpAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Run the admission policy before the handler.
///
/// Denied requests get a 429, requests without a required device id get a
/// 400, and every other response carries the quota headers.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn enforce_admission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let outcome = {
        let ctx = RequestContext::new(request.headers(), peer_ip(request.extensions()));
        state.policy.decide(&ctx)
    };

    let decision = match outcome {
        Ok(decision) => decision,
        Err(GateError::RequiredIdentityMissing { accepted_headers }) => {
            debug!("Rejecting request without a device id");
            return identity_required(&accepted_headers);
        }
        Err(e) => {
            // decide() recovers store faults itself; anything else still fails open.
            warn!(error = %e, "Admission check failed, letting request through");
            return next.run(request).await;
        }
    };

    if let Some(notice) = &decision.limit_reached {
        warn!(
            key = %notice.key,
            count = notice.count,
            limit = notice.limit,
            retry_after = notice.retry_after_seconds,
            "Rate limit exceeded"
        );
        return too_many_requests(&decision);
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}
