//! Rate limit key generation and handling.

use std::fmt;

use serde::{Serialize, Serializer};

/// What kind of identity a key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    Device,
    Ip,
    Fingerprint,
}

impl KeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScope::Device => "device",
            KeyScope::Ip => "ip",
            KeyScope::Fingerprint => "fingerprint",
        }
    }
}

/// A key that uniquely identifies a caller's counter, rendered as
/// `<scope>:<identifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    scope: KeyScope,
    identifier: String,
}

impl RateLimitKey {
    pub fn new(scope: KeyScope, identifier: impl Into<String>) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
        }
    }

    pub fn device(device_id: impl Into<String>) -> Self {
        Self::new(KeyScope::Device, device_id)
    }

    pub fn ip(addr: impl Into<String>) -> Self {
        Self::new(KeyScope::Ip, addr)
    }

    pub fn fingerprint(hash: impl Into<String>) -> Self {
        Self::new(KeyScope::Fingerprint, hash)
    }

    pub fn scope(&self) -> KeyScope {
        self.scope
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope.as_str(), self.identifier)
    }
}

impl Serialize for RateLimitKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
