//! Out-of-band inspection and reset of device quotas.
//!
//! Authorization is the caller's job: everything here assumes the operator
//! has already been vetted.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::identity::{
    check_device_id, generate_secure_id, recommendations, IdentityResolver, IdentitySource,
};
use crate::ratelimit::{CounterBackend, QuotaStatus, RateLimitKey};

/// A freshly issued device id for a client to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapId {
    pub device_id: String,
    pub source: IdentitySource,
    /// Header the client should send the id in
    pub header: String,
    pub instructions: String,
}

/// Result of validating a device id on request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub device_id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

/// Administrative operations over the shared counter store.
pub struct AdminInterface {
    store: Arc<dyn CounterBackend>,
    resolver: IdentityResolver,
    max_requests: u64,
    preferred_header: String,
}

impl AdminInterface {
    pub fn new(
        store: Arc<dyn CounterBackend>,
        resolver: IdentityResolver,
        max_requests: u64,
        preferred_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            max_requests,
            preferred_header: preferred_header.into(),
        }
    }

    /// Issue a bootstrap device id.
    pub fn bootstrap(&self) -> BootstrapId {
        let device_id = generate_secure_id();
        info!(device_id = %device_id, "Issued bootstrap device id");
        BootstrapId {
            instructions: format!(
                "Store this id on the device and send it in the {} header on every request",
                self.preferred_header
            ),
            device_id,
            source: IdentitySource::Generated,
            header: self.preferred_header.clone(),
        }
    }

    /// Validate a device id and explain any rejection.
    pub fn validate(&self, device_id: &str) -> ValidationReport {
        match check_device_id(device_id, self.resolver.denylist()) {
            Ok(()) => ValidationReport {
                device_id: device_id.to_string(),
                valid: true,
                rule: None,
                reason: None,
                recommendations: Vec::new(),
            },
            Err(invalid) => ValidationReport {
                device_id: device_id.to_string(),
                valid: false,
                rule: Some(invalid.rule().to_string()),
                reason: Some(invalid.to_string()),
                recommendations: recommendations(),
            },
        }
    }

    /// Clear a device's counter. Invalid ids are rejected with `FormatInvalid`.
    pub fn reset_device(&self, device_id: &str) -> Result<()> {
        let key = self.device_key(device_id)?;
        self.store.reset(&key)?;
        info!(key = %key, "Device quota reset");
        Ok(())
    }

    /// Current quota of a device. No recent activity yields a full quota.
    pub fn device_status(&self, device_id: &str) -> Result<QuotaStatus> {
        let key = self.device_key(device_id)?;
        let entry = self.store.get(&key)?;
        let now = self.store.now();
        let fresh_reset = now.checked_add_signed(self.store.window()).unwrap_or(now);
        Ok(QuotaStatus::from_entry(key, entry, self.max_requests, fresh_reset))
    }

    fn device_key(&self, device_id: &str) -> Result<RateLimitKey> {
        check_device_id(device_id, self.resolver.denylist())?;
        Ok(RateLimitKey::device(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GateError;
    use crate::identity::InvalidDeviceId;
    use crate::ratelimit::{Clock, CounterStore, ManualClock};
    use chrono::TimeDelta;
    use std::time::Duration;

    const DEVICE: &str = "abcdefgh12345678";

    fn admin() -> (AdminInterface, Arc<CounterStore>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(
            CounterStore::with_clock(Duration::from_millis(1000), Arc::new(clock.clone())).unwrap(),
        );
        let admin = AdminInterface::new(store.clone(), IdentityResolver::default(), 3, "X-Device-ID");
        (admin, store, clock)
    }

    #[test]
    fn test_reset_device_clears_counter() {
        let (admin, store, _clock) = admin();
        let key = RateLimitKey::device(DEVICE);
        for _ in 0..4 {
            store.increment(&key).unwrap();
        }

        admin.reset_device(DEVICE).unwrap();
        assert!(store.get(&key).unwrap().is_none());
        assert_eq!(store.increment(&key).unwrap().count, 1);
    }

    #[test]
    fn test_reset_rejects_invalid_ids() {
        let (admin, _store, _clock) = admin();
        match admin.reset_device("11111111") {
            Err(GateError::FormatInvalid(InvalidDeviceId::RepeatedCharacter)) => {}
            other => panic!("expected FormatInvalid, got {:?}", other),
        }
        assert!(matches!(
            admin.reset_device("short"),
            Err(GateError::FormatInvalid(InvalidDeviceId::TooShort { .. }))
        ));
    }

    #[test]
    fn test_status_without_activity_is_full_quota() {
        let (admin, _store, clock) = admin();
        let status = admin.device_status(DEVICE).unwrap();

        assert_eq!(status.count, 0);
        assert_eq!(status.remaining, 3);
        assert_eq!(status.reset_time, clock.now() + TimeDelta::milliseconds(1000));
    }

    #[test]
    fn test_status_reflects_activity_and_expiry() {
        let (admin, store, clock) = admin();
        let key = RateLimitKey::device(DEVICE);
        let first = store.increment(&key).unwrap();
        store.increment(&key).unwrap();

        let status = admin.device_status(DEVICE).unwrap();
        assert_eq!(status.count, 2);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_time, first.window_end);

        clock.advance(TimeDelta::milliseconds(1001));
        assert_eq!(admin.device_status(DEVICE).unwrap().count, 0);
    }

    #[test]
    fn test_bootstrap_issues_valid_ids() {
        let (admin, _store, _clock) = admin();
        let issued = admin.bootstrap();

        assert_eq!(issued.source, IdentitySource::Generated);
        assert_eq!(issued.header, "X-Device-ID");
        assert!(admin.validate(&issued.device_id).valid);
        assert_ne!(issued.device_id, admin.bootstrap().device_id);
    }

    #[test]
    fn test_validate_reports_rule_and_recommendations() {
        let (admin, _store, _clock) = admin();

        let ok = admin.validate("device_12345_mobile");
        assert!(ok.valid);
        assert!(ok.recommendations.is_empty());

        let bad = admin.validate("test");
        assert!(!bad.valid);
        assert_eq!(bad.rule.as_deref(), Some("min_length"));
        assert!(!bad.recommendations.is_empty());

        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("rule").is_none());
        assert_eq!(json["deviceId"], "device_12345_mobile");
    }
}
