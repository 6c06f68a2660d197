//! Admission decisions and the values rendered from them.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::counter::CounterEntry;
use super::key::RateLimitKey;

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const HEADER_WINDOW: HeaderName = HeaderName::from_static("x-ratelimit-window");

/// Notice that a caller went over its quota.
///
/// Returned inside the decision so the caller decides how to log or alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitReached {
    pub key: RateLimitKey,
    pub count: u64,
    pub limit: u64,
    pub retry_after_seconds: u64,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub retry_after_seconds: Option<u64>,
    /// Window length in milliseconds
    pub window_ms: u64,
    pub limit_reached: Option<LimitReached>,
    /// Set when an internal fault forced the request through
    pub failed_open: bool,
}

impl RateLimitDecision {
    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at.timestamp()));
        headers.insert(HEADER_WINDOW, HeaderValue::from(self.window_ms));
    }

    /// The 429 payload, when the request was denied.
    pub fn denial_body(&self) -> Option<DenialBody> {
        if self.allowed {
            return None;
        }
        let retry_after = self.retry_after_seconds.unwrap_or_default();
        Some(DenialBody {
            error: "rate_limit_exceeded".to_string(),
            message: format!(
                "Too many requests from this device. Try again in {} seconds.",
                retry_after
            ),
            rate_limit_info: RateLimitInfo {
                limit: self.limit,
                remaining: 0,
                reset_time: self.reset_at,
                retry_after,
            },
        })
    }
}

/// Body returned with a denied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialBody {
    pub error: String,
    pub message: String,
    pub rate_limit_info: RateLimitInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// Serialized as RFC 3339 / ISO-8601
    pub reset_time: DateTime<Utc>,
    pub retry_after: u64,
}

/// Read-only snapshot of a key's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub key: RateLimitKey,
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time: DateTime<Utc>,
}

impl QuotaStatus {
    /// Snapshot from an entry, or a full quota when there is no recent activity.
    pub fn from_entry(
        key: RateLimitKey,
        entry: Option<CounterEntry>,
        limit: u64,
        fresh_reset: DateTime<Utc>,
    ) -> Self {
        match entry {
            Some(entry) => Self {
                key,
                count: entry.count,
                limit,
                remaining: entry.remaining(limit),
                reset_time: entry.window_end,
            },
            None => Self {
                key,
                count: 0,
                limit,
                remaining: limit,
                reset_time: fresh_reset,
            },
        }
    }
}
