//! monitor-core — configuration shared by the monitor crates.
//!
//! Loads `monitor.toml`, applies defaults for unset fields, and validates
//! the probe target and durations before the daemon starts.

pub mod config;
pub mod duration;
pub mod error;

pub use config::{GrafanaConfig, MonitorConfig, ProbeConfig, ServerConfig};
pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
