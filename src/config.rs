use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::presets::DEFAULT_MAX_CREDIT_LOAD;

pub const DEFAULT_CONFIG_FILE: &str = "timetable.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Default `env_logger` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default = "default_max_credit_load")]
    pub max_credit_load: u32,

    /// Cap on timetables returned per request.
    #[serde(default)]
    pub max_solutions: Option<usize>,

    /// Wall-clock limit per search, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Searches allowed to run at once.
    #[serde(default = "default_max_concurrent_searches")]
    pub max_concurrent_searches: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_max_credit_load() -> u32 {
    DEFAULT_MAX_CREDIT_LOAD
}

fn default_max_concurrent_searches() -> usize {
    4
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_filter: default_log_filter(),
            max_credit_load: default_max_credit_load(),
            max_solutions: None,
            timeout_ms: None,
            max_concurrent_searches: default_max_concurrent_searches(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        self.bind_addr
            .parse()
            .map_err(|e| format!("bind_addr '{}' is not a socket address: {e}", self.bind_addr))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.socket_addr()?;

        const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log_filter.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "log_filter '{}' must be one of: {}",
                self.log_filter,
                LEVELS.join(", ")
            ));
        }

        if self.max_credit_load == 0 {
            return Err("max_credit_load must be greater than zero".to_string());
        }

        if self.max_concurrent_searches == 0 {
            return Err("max_concurrent_searches must be greater than zero".to_string());
        }

        if self.max_solutions == Some(0) {
            warn!("max_solutions is 0; every search will stop before finding anything");
        }

        Ok(())
    }
}

/// Loads the configuration; a missing file is not an error.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(
            Environment::with_prefix("TIMETABLE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.max_credit_load, 30);
        assert_eq!(config.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load("does/not/exist.toml").unwrap();
        assert_eq!(config.max_credit_load, DEFAULT_MAX_CREDIT_LOAD);
        assert_eq!(config.max_solutions, None);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ServiceConfig = Config::builder()
            .add_source(File::from_str(
                "max_credit_load = 24\ntimeout_ms = 1500",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.max_credit_load, 24);
        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_validation_failures() {
        let bad_addr = ServiceConfig {
            bind_addr: "localhost".to_string(),
            ..Default::default()
        };
        assert!(bad_addr.validate().unwrap_err().contains("bind_addr"));

        let bad_level = ServiceConfig {
            log_filter: "verbose".to_string(),
            ..Default::default()
        };
        assert!(bad_level.validate().unwrap_err().contains("log_filter"));

        let no_credits = ServiceConfig {
            max_credit_load: 0,
            ..Default::default()
        };
        assert!(no_credits.validate().is_err());
    }
}
