//! monitor.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub probe: ProbeConfig,
    pub server: ServerConfig,
    pub grafana: GrafanaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Target probed on every tick.
    pub url: String,
    /// Tick interval, e.g. "1m".
    pub interval: String,
    /// Per-probe deadline, e.g. "30s".
    pub timeout: String,
    /// Accept invalid TLS certificates on the target.
    pub insecure_skip_verify: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "https://google.com/".to_string(),
            interval: "1m".to_string(),
            timeout: "30s".to_string(),
            insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Programs `POST /exec` may run. Empty disables the endpoint.
    pub exec_allowed_commands: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            exec_allowed_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrafanaConfig {
    pub host: String,
    pub api_token: String,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:3000".to_string(),
            api_token: String::new(),
        }
    }
}

impl GrafanaConfig {
    /// Annotations are only posted when a token has been configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_token.trim().is_empty()
    }
}

impl ProbeConfig {
    pub fn interval(&self) -> ConfigResult<Duration> {
        non_zero_duration("probe.interval", &self.interval)
    }

    pub fn timeout(&self) -> ConfigResult<Duration> {
        non_zero_duration("probe.timeout", &self.timeout)
    }
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the values the probe loop depends on.
    pub fn validate(&self) -> ConfigResult<()> {
        self.probe.interval()?;
        self.probe.timeout()?;

        let invalid = || ConfigError::InvalidUrl(self.probe.url.clone());
        let url = Url::parse(self.probe.url.trim()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid());
        }
        match url.host_str() {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(invalid()),
        }
    }
}

fn non_zero_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }),
    }
}
