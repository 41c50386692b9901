// Copyright (c) 2026 D-PlaneOS Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Node configuration. A single TOML document, discovered by a fixed
//! precedence order, overridable by a handful of `DPLANE_*` environment
//! variables for container deployments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen_addr: String,
    pub db_path: PathBuf,
    pub hmac_key_path: PathBuf,
    /// Directory a previous desired-state document is copied into
    /// before a new one replaces it, so an operator can roll back a
    /// bad `gitops/state` push by hand. `None` disables the safety net.
    pub backup_path: Option<PathBuf>,
    pub networkd_prefix: String,
    pub capacity: CapacityThresholds,
    pub rate_limit: RateLimitConfig,
    pub alerts: AlertsConfig,
    pub observability: ObservabilityConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8443".to_string(),
            db_path: PathBuf::from("/var/lib/dplaned/dplane.db"),
            hmac_key_path: PathBuf::from("/var/lib/dplaned/audit.key"),
            backup_path: None,
            networkd_prefix: "50-dplane-".to_string(),
            capacity: CapacityThresholds::default(),
            rate_limit: RateLimitConfig::default(),
            alerts: AlertsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityThresholds {
    pub warn_fraction: f64,
    pub critical_fraction: f64,
    pub emergency_fraction: f64,
    pub hysteresis_fraction: f64,
    pub cooldown_seconds: u64,
    pub emergency_release_bytes: u64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            warn_fraction: 0.80,
            critical_fraction: 0.90,
            emergency_fraction: 0.95,
            hysteresis_fraction: 0.02,
            cooldown_seconds: 300,
            emergency_release_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_minute: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub hysteresis_seconds: u64,
    pub cooldown_seconds: u64,
    pub smtp_relay: Option<String>,
    pub smtp_from: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            hysteresis_seconds: 30,
            cooldown_seconds: 300,
            smtp_relay: None,
            smtp_from: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: Option<String>,
    pub otlp_endpoint: Option<String>,
    pub metrics_addr: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 1. explicit CLI path, 2. `DPLANE_CONFIG_PATH`, 3. `./dplane.toml`,
    /// 4. `/etc/dplane/dplane.toml`, 5. built-in defaults.
    pub fn discover(cli_path: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = cli_path {
            return Some(path);
        }
        if let Ok(path) = std::env::var("DPLANE_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }
        let cwd = PathBuf::from("./dplane.toml");
        if cwd.exists() {
            return Some(cwd);
        }
        let system = PathBuf::from("/etc/dplane/dplane.toml");
        if system.exists() {
            return Some(system);
        }
        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = match Self::discover(cli_path) {
            Some(path) => {
                tracing::info!(?path, "loading configuration");
                Self::from_toml_file(&path)?
            }
            None => {
                tracing::warn!("no configuration file found, using built-in defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Sanity-checks thresholds and paths before the daemon acts on
    /// them (spec §2's ambient "validated before use" requirement).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!("listen_addr {:?} is not a valid socket address", self.listen_addr)));
        }
        let c = &self.capacity;
        if !(0.0..=1.0).contains(&c.warn_fraction) || !(0.0..=1.0).contains(&c.critical_fraction) || !(0.0..=1.0).contains(&c.emergency_fraction) {
            return Err(ConfigError::Invalid("capacity thresholds must be fractions in [0,1]".into()));
        }
        if !(c.warn_fraction < c.critical_fraction && c.critical_fraction < c.emergency_fraction) {
            return Err(ConfigError::Invalid("capacity thresholds must be strictly increasing: warn < critical < emergency".into()));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid("rate_limit.requests_per_minute must be greater than zero".into()));
        }
        if self.networkd_prefix.is_empty() {
            return Err(ConfigError::Invalid("networkd_prefix must not be empty".into()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DPLANE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Ok(path) = std::env::var("DPLANE_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DPLANE_BACKUP_PATH") {
            self.backup_path = Some(PathBuf::from(path));
        }
        if let Ok(endpoint) = std::env::var("DPLANE_OTLP_ENDPOINT") {
            self.observability.otlp_endpoint = Some(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_thresholds() {
        let config = NodeConfig::default();
        assert!(config.capacity.warn_fraction < config.capacity.critical_fraction);
        assert!(config.capacity.critical_fraction < config.capacity.emergency_fraction);
    }

    #[test]
    fn toml_roundtrip() {
        let config = NodeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.listen_addr, config.listen_addr);
    }

    #[test]
    fn missing_file_surfaces_read_error() {
        let err = NodeConfig::from_toml_file("/nonexistent/dplane.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn default_config_validates() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_order_thresholds_are_rejected() {
        let mut config = NodeConfig::default();
        config.capacity.warn_fraction = 0.95;
        config.capacity.critical_fraction = 0.90;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let mut config = NodeConfig::default();
        config.rate_limit.requests_per_minute = 0;
        assert!(config.validate().is_err());
    }
}
