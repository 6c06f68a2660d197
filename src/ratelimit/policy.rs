//! The admission policy: key derivation and allow/deny decisions.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, trace};

use super::backend::CounterBackend;
use super::counter::CounterEntry;
use super::decision::{LimitReached, QuotaStatus, RateLimitDecision};
use super::key::RateLimitKey;
use crate::config::AdmissionConfig;
use crate::error::{GateError, Result};
use crate::identity::{generate_fingerprint, DeviceIdentity, IdentityResolver, RequestContext};

/// Decides whether requests are admitted.
///
/// The store is injected by the composition root and shared with the
/// administrative interface and the sweeper.
pub struct AdmissionPolicy {
    config: AdmissionConfig,
    resolver: IdentityResolver,
    store: Arc<dyn CounterBackend>,
}

impl AdmissionPolicy {
    /// Create a policy over `store`. The store's window must match `config.window_ms`.
    pub fn new(
        config: AdmissionConfig,
        resolver: IdentityResolver,
        store: Arc<dyn CounterBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let expected = i64::try_from(config.window_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .ok_or_else(|| {
                GateError::Config(format!(
                    "admission.window_ms {} is out of range",
                    config.window_ms
                ))
            })?;
        if store.window() != expected {
            return Err(GateError::Config(format!(
                "counter store window {}ms does not match admission.window_ms {}",
                store.window().num_milliseconds(),
                config.window_ms
            )));
        }

        Ok(Self {
            config,
            resolver,
            store,
        })
    }

    /// Resolve the full identity of a request, fingerprint included.
    pub fn identify(&self, request: &RequestContext<'_>) -> DeviceIdentity {
        self.resolver.resolve(
            request,
            &self.config.device_id_header_names,
            self.config.trust_proxy,
        )
    }

    /// Derive the counter key for a request.
    ///
    /// Precedence: valid device id header, then `RequiredIdentityMissing` if a
    /// device id is mandatory, then client address, then fingerprint.
    pub fn derive_key(&self, request: &RequestContext<'_>) -> Result<RateLimitKey> {
        if let Some(device_id) = self
            .resolver
            .extract_device_id(request.headers, &self.config.device_id_header_names)
        {
            return Ok(RateLimitKey::device(device_id));
        }

        if self.config.require_device_id {
            return Err(GateError::RequiredIdentityMissing {
                accepted_headers: self.config.device_id_header_names.clone(),
            });
        }

        if self.config.fallback_to_ip {
            return Ok(RateLimitKey::ip(request.client_addr(self.config.trust_proxy)));
        }

        let signals = request.signals(self.config.trust_proxy);
        Ok(RateLimitKey::fingerprint(generate_fingerprint(&signals)))
    }

    /// Count the request and decide whether it is admitted.
    ///
    /// The only error is `RequiredIdentityMissing`. Store faults are logged
    /// and the request is let through.
    pub fn decide(&self, request: &RequestContext<'_>) -> Result<RateLimitDecision> {
        let key = self.derive_key(request)?;

        let entry = match self.store.increment(&key) {
            Ok(entry) => entry,
            Err(e) => {
                error!(key = %key, error = %e, "Counter store fault, failing open");
                return Ok(self.fail_open());
            }
        };

        let decision = self.decision_for(key, entry, self.store.now());
        trace!(
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Admission decision made"
        );
        Ok(decision)
    }

    /// Quota snapshot for the request's identity without counting it.
    pub fn status(&self, request: &RequestContext<'_>) -> Result<QuotaStatus> {
        let key = self.derive_key(request)?;
        self.status_for(key)
    }

    /// Quota snapshot for an explicit key.
    pub fn status_for(&self, key: RateLimitKey) -> Result<QuotaStatus> {
        let entry = self.store.get(&key)?;
        Ok(QuotaStatus::from_entry(
            key,
            entry,
            self.config.max_requests,
            self.fresh_reset(),
        ))
    }

    fn decision_for(
        &self,
        key: RateLimitKey,
        entry: CounterEntry,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let limit = self.config.max_requests;
        let allowed = entry.count <= limit;

        let (retry_after_seconds, limit_reached) = if allowed {
            (None, None)
        } else {
            let retry_after = retry_after_seconds(entry.window_end, now);
            debug!(
                key = %key,
                count = entry.count,
                limit = limit,
                retry_after = retry_after,
                "Rate limit exceeded"
            );
            (
                Some(retry_after),
                Some(LimitReached {
                    key,
                    count: entry.count,
                    limit,
                    retry_after_seconds: retry_after,
                }),
            )
        };

        RateLimitDecision {
            allowed,
            limit,
            remaining: entry.remaining(limit),
            reset_at: entry.window_end,
            retry_after_seconds,
            window_ms: self.config.window_ms,
            limit_reached,
            failed_open: false,
        }
    }

    fn fail_open(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.config.max_requests,
            remaining: self.config.max_requests,
            reset_at: self.fresh_reset(),
            retry_after_seconds: None,
            window_ms: self.config.window_ms,
            limit_reached: None,
            failed_open: true,
        }
    }

    /// When a window opened right now would end.
    fn fresh_reset(&self) -> DateTime<Utc> {
        let now = self.store.now();
        now.checked_add_signed(self.store.window()).unwrap_or(now)
    }
}

/// Whole seconds until `window_end`, rounded up, at least one.
fn retry_after_seconds(window_end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (window_end - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}
