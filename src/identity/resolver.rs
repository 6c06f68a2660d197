//! Caller identity resolution from untrusted request metadata.

use std::fmt;
use std::net::IpAddr;

use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use tracing::trace;

use super::fingerprint::{generate_fingerprint, RequestSignals};
use super::validator::{validate_device_id, DenyList};

/// Placeholder address used when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// How a device identity was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// A valid id from one of the candidate headers
    Header,
    /// Derived from request signals
    Fingerprint,
    /// Issued by the bootstrap endpoint
    Generated,
}

/// Client platform inferred from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
    Unknown,
}

impl Platform {
    /// Infer the platform by case-insensitive substring matching.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        // Android UAs also mention Linux, and iPad UAs may mention Macintosh.
        if ua.contains("android") {
            Platform::Android
        } else if ua.contains("iphone") || ua.contains("ipad") {
            Platform::Ios
        } else if ua.contains("windows") {
            Platform::Windows
        } else if ua.contains("macintosh") {
            Platform::Macos
        } else if ua.contains("linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Resolved identity of a caller. Built fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: Option<String>,
    pub fingerprint: String,
    pub source: IdentitySource,
    pub platform: Platform,
    pub is_valid: bool,
}

/// The parts of an inbound request identity resolution looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub headers: &'a HeaderMap,
    /// Socket peer address, if the transport exposes one
    pub peer_addr: Option<IpAddr>,
}

impl<'a> RequestContext<'a> {
    pub fn new(headers: &'a HeaderMap, peer_addr: Option<IpAddr>) -> Self {
        Self { headers, peer_addr }
    }

    /// Resolve the client address.
    ///
    /// With `trust_proxy`, the first parseable `X-Forwarded-For` hop wins,
    /// then `X-Real-IP`. Otherwise only the socket peer address is used.
    pub fn client_addr(&self, trust_proxy: bool) -> String {
        if trust_proxy {
            let forwarded = self
                .header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
            let real_ip = || {
                self.header("x-real-ip")
                    .and_then(|v| v.trim().parse::<IpAddr>().ok())
            };

            if let Some(ip) = forwarded.or_else(real_ip) {
                return ip.to_string();
            }
        }

        self.peer_addr
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    /// Request signals for fingerprinting, with the client address resolved.
    pub fn signals(&self, trust_proxy: bool) -> RequestSignals {
        RequestSignals::from_headers(self.headers, self.client_addr(trust_proxy))
    }

    fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Resolves caller identities against a spoofing denylist.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    denylist: DenyList,
}

impl IdentityResolver {
    pub fn new(denylist: DenyList) -> Self {
        Self { denylist }
    }

    pub fn denylist(&self) -> &DenyList {
        &self.denylist
    }

    /// Check a device id against format rules and the denylist.
    pub fn validate_device_id(&self, id: &str) -> bool {
        validate_device_id(id, &self.denylist)
    }

    /// Return the first candidate header value, in priority order, that validates.
    pub fn extract_device_id(&self, headers: &HeaderMap, header_names: &[String]) -> Option<String> {
        header_names.iter().find_map(|name| {
            let value = headers.get(name.as_str())?.to_str().ok()?.trim();
            if self.validate_device_id(value) {
                Some(value.to_string())
            } else {
                trace!(header = %name, "Ignoring invalid device id header");
                None
            }
        })
    }

    /// Resolve the caller identity. Never fails; worst case the identity is
    /// fingerprint-based.
    pub fn resolve(
        &self,
        request: &RequestContext<'_>,
        header_names: &[String],
        trust_proxy: bool,
    ) -> DeviceIdentity {
        let user_agent = request
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let platform = Platform::from_user_agent(user_agent);
        let fingerprint = generate_fingerprint(&request.signals(trust_proxy));

        match self.extract_device_id(request.headers, header_names) {
            Some(device_id) => DeviceIdentity {
                device_id: Some(device_id),
                fingerprint,
                source: IdentitySource::Header,
                platform,
                is_valid: true,
            },
            None => DeviceIdentity {
                device_id: None,
                fingerprint,
                source: IdentitySource::Fingerprint,
                platform,
                is_valid: false,
            },
        }
    }
}

/// Generate a bootstrap device id for a client to persist and send back.
///
/// Base-36 millisecond timestamp, a hyphen, then 128 bits of OS randomness
/// in hex. The result always passes validation.
pub fn generate_secure_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut suffix = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!("{}-{}", to_base36(millis), hex::encode(suffix))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}
