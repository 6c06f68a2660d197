//! Deterministic request fingerprints for callers without a device id.

use axum::http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName};
use sha2::{Digest, Sha256};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 24;

/// The request signals a fingerprint is computed over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub accept: String,
    /// Resolved client address (already proxy-aware)
    pub client_ip: String,
}

impl RequestSignals {
    /// Collect signals from request headers. Missing or non-UTF-8 headers become empty strings.
    pub fn from_headers(headers: &HeaderMap, client_ip: impl Into<String>) -> Self {
        let get = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            user_agent: get(USER_AGENT),
            accept_language: get(ACCEPT_LANGUAGE),
            accept_encoding: get(ACCEPT_ENCODING),
            accept: get(ACCEPT),
            client_ip: client_ip.into(),
        }
    }
}

/// Compute a one-way fingerprint of the request signals.
///
/// SHA-256 over the signals in a fixed order, each prefixed with its byte
/// length, hex encoded and truncated to [`FINGERPRINT_LEN`] characters.
pub fn generate_fingerprint(signals: &RequestSignals) -> String {
    let mut hasher = Sha256::new();
    for part in [
        &signals.user_agent,
        &signals.accept_language,
        &signals.accept_encoding,
        &signals.accept,
        &signals.client_ip,
    ] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }

    let mut fingerprint = hex::encode(hasher.finalize());
    fingerprint.truncate(FINGERPRINT_LEN);
    fingerprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signals(user_agent: &str, ip: &str) -> RequestSignals {
        RequestSignals {
            user_agent: user_agent.to_string(),
            accept_language: "en-US".to_string(),
            accept_encoding: "gzip".to_string(),
            accept: "*/*".to_string(),
            client_ip: ip.to_string(),
        }
    }

    #[test]
    fn test_fingerprint_is_fixed_length_hex() {
        let fp = generate_fingerprint(&signals("curl/8.0", "10.0.0.1"));
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = generate_fingerprint(&signals("curl/8.0", "10.0.0.1"));
        let b = generate_fingerprint(&signals("curl/8.0", "10.0.0.1"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_by_signal() {
        let base = generate_fingerprint(&signals("curl/8.0", "10.0.0.1"));
        assert_ne!(base, generate_fingerprint(&signals("curl/8.1", "10.0.0.1")));
        assert_ne!(base, generate_fingerprint(&signals("curl/8.0", "10.0.0.2")));
    }

    #[test]
    fn test_field_boundaries_matter() {
        let a = RequestSignals {
            user_agent: "ab".to_string(),
            ..Default::default()
        };
        let b = RequestSignals {
            user_agent: "a".to_string(),
            accept_language: "b".to_string(),
            ..Default::default()
        };
        assert_ne!(generate_fingerprint(&a), generate_fingerprint(&b));
    }

    #[test]
    fn test_separator_in_header_value_cannot_shift_fields() {
        let a = RequestSignals {
            user_agent: "a|".to_string(),
            ..Default::default()
        };
        let b = RequestSignals {
            user_agent: "a".to_string(),
            accept_language: "|".to_string(),
            ..Default::default()
        };
        assert_ne!(generate_fingerprint(&a), generate_fingerprint(&b));

        // A trailing accept value cannot borrow digits from the client address
        let victim = RequestSignals {
            accept: "*/*".to_string(),
            client_ip: "11.0.0.11".to_string(),
            ..Default::default()
        };
        let spoofed = RequestSignals {
            accept: "*/*|1".to_string(),
            client_ip: "1.0.0.11".to_string(),
            ..Default::default()
        };
        assert_ne!(generate_fingerprint(&victim), generate_fingerprint(&spoofed));
    }

    #[test]
    fn test_signals_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let signals = RequestSignals::from_headers(&headers, "192.168.1.10");
        assert_eq!(signals.user_agent, "Mozilla/5.0");
        assert_eq!(signals.accept, "application/json");
        assert_eq!(signals.accept_language, "");
        assert_eq!(signals.client_ip, "192.168.1.10");
    }
}
