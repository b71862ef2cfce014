//! Configuration module for the uptime monitor.
//!
//! Process settings come from environment variables with sensible defaults.
//! The monitored services come from a YAML file.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::monitor::{CheckKind, MaintenanceWindow, ServiceDefinition};

const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
const DEFAULT_INTERVAL_SECS: f64 = 300.0;
const DEFAULT_MAX_TRIES: u32 = 3;
const DEFAULT_HEALTHCHECK_INTERVAL_SECS: u64 = 3600;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the monitor config file (default: "config.yaml")
    pub config_path: PathBuf,
    /// Bind address for the status API (default: "0.0.0.0")
    pub http_host: String,
    /// Port for the status API (default: 8080)
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.yaml"),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPTIME_MONITOR_CONFIG`: monitor config file (default: "config.yaml")
    /// - `UPTIME_MONITOR_HOST`: status API bind address (default: "0.0.0.0")
    /// - `UPTIME_MONITOR_PORT`: status API port (default: 8080)
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = env::var("UPTIME_MONITOR_CONFIG") {
            cfg.config_path = PathBuf::from(path);
        }

        if let Ok(host) = env::var("UPTIME_MONITOR_HOST") {
            cfg.http_host = host;
        }

        if let Ok(port_str) = env::var("UPTIME_MONITOR_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        cfg
    }
}

/// SMTP settings. Every field is optional; delivery is skipped unless all
/// are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub notification_email: Option<String>,
}

/// External liveness ping.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    pub url: Option<String>,
    #[serde(default = "default_healthcheck_interval")]
    pub interval: u64,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval: DEFAULT_HEALTHCHECK_INTERVAL_SECS,
        }
    }
}

fn default_healthcheck_interval() -> u64 {
    DEFAULT_HEALTHCHECK_INTERVAL_SECS
}

/// Parsed and validated monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Process timezone name, resolved later so a bad value only warns
    pub timezone: Option<String>,
    pub email: EmailConfig,
    pub healthcheck: HealthcheckConfig,
    /// Sorted by name
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    timezone: Option<String>,
    #[serde(default)]
    email: EmailConfig,
    #[serde(default)]
    healthcheck: HealthcheckConfig,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(flatten)]
    check: CheckKind,
    timeout: Option<f64>,
    max_tries: Option<u32>,
    interval: Option<f64>,
    maintenance_window: Option<RawWindow>,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWindow {
    start: String,
    end: String,
}

impl MonitorConfig {
    /// Load and validate the config file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        if raw.services.is_empty() {
            return Err(ConfigError::Invalid("no services configured".to_string()));
        }

        let services = raw
            .services
            .into_iter()
            .map(|(name, service)| service.into_definition(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            timezone: raw.timezone,
            email: raw.email,
            healthcheck: raw.healthcheck,
            services,
        })
    }
}

impl RawService {
    fn into_definition(self, name: String) -> Result<ServiceDefinition, ConfigError> {
        let max_tries = self.max_tries.unwrap_or(DEFAULT_MAX_TRIES);
        if max_tries == 0 {
            return Err(ConfigError::Invalid(format!("service {}: max_tries must be at least 1", name)));
        }

        let maintenance_window = match self.maintenance_window {
            Some(w) => Some(MaintenanceWindow::parse(&w.start, &w.end).map_err(|e| {
                ConfigError::Invalid(format!(
                    "service {}: maintenance window {}-{} is not HH:MM: {}",
                    name, w.start, w.end, e
                ))
            })?),
            None => None,
        };

        Ok(ServiceDefinition {
            name,
            check: self.check,
            timeout: seconds_or(self.timeout, DEFAULT_TIMEOUT_SECS),
            max_tries,
            interval: seconds_or(self.interval, DEFAULT_INTERVAL_SECS),
            maintenance_window,
            timezone: self.timezone,
        })
    }
}

/// Positive finite seconds, or the default.
fn seconds_or(value: Option<f64>, default: f64) -> Duration {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Duration::from_secs_f64(v),
        _ => Duration::from_secs_f64(default),
    }
}
