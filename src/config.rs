//! Configuration management for devicegate.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GateError, Result};
use crate::identity::DenyList;

/// Prefix for environment overrides, e.g. `DEVICEGATE__ADMISSION__MAX_REQUESTS=50`.
pub const ENV_PREFIX: &str = "DEVICEGATE";

/// Longest accepted counting window: one leap year, in milliseconds.
pub const MAX_WINDOW_MS: u64 = 366 * 24 * 60 * 60 * 1000;

/// Main configuration for the devicegate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission policy configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Background sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Device id spoofing denylist
    #[serde(default)]
    pub denylist: DenyList,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Bearer token for the device reset endpoint. Reset is disabled when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            admin_token: None,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Admission policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Length of a counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Reject callers without a valid device id
    #[serde(default)]
    pub require_device_id: bool,

    /// Key callers without a device id by client address instead of fingerprint
    #[serde(default = "default_true")]
    pub fallback_to_ip: bool,

    /// Headers searched for a device id, highest priority first
    #[serde(default = "default_device_id_header_names")]
    pub device_id_header_names: Vec<String>,

    /// Honor `X-Forwarded-For` / `X-Real-IP` when resolving the client address
    #[serde(default)]
    pub trust_proxy: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            require_device_id: false,
            fallback_to_ip: true,
            device_id_header_names: default_device_id_header_names(),
            trust_proxy: false,
        }
    }
}

impl AdmissionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(GateError::Config("admission.window_ms must be positive".to_string()));
        }
        if self.window_ms > MAX_WINDOW_MS {
            return Err(GateError::Config(format!(
                "admission.window_ms must be at most {}",
                MAX_WINDOW_MS
            )));
        }
        if self.max_requests == 0 {
            return Err(GateError::Config(
                "admission.max_requests must be positive".to_string(),
            ));
        }
        if self.device_id_header_names.iter().all(|h| h.trim().is_empty()) {
            return Err(GateError::Config(
                "admission.device_id_header_names must name at least one header".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_max_requests() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_device_id_header_names() -> Vec<String> {
    ["X-Device-ID", "Device-ID", "X-Client-ID", "Client-ID"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Background sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps of expired counters
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_sweep_interval() -> u64 {
    60
}

impl GateConfig {
    /// Load configuration from an optional YAML file, overlaid with
    /// `DEVICEGATE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("admission.device_id_header_names")
                .try_parsing(true),
        );

        let config: GateConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| GateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.admission.validate()?;
        if self.sweep.interval_secs == 0 {
            return Err(GateError::Config("sweep.interval_secs must be positive".to_string()));
        }
        Ok(())
    }
}
