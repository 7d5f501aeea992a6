//! Environment configuration.
//!
//! Loaded once at startup. Malformed values are startup errors, not
//! runtime surprises.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the store HTTP API.
    pub store_api_url: String,
    /// Mutable path of the index pointer.
    pub index_pointer_path: String,

    pub snapshot_interval: Duration,
    pub auto_snapshot: bool,

    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub queue_capacity: usize,
    pub shutdown_grace: Duration,

    /// Directory for the snapshot lock and checkpoint files.
    pub snapshot_work_dir: PathBuf,
    /// Directory for local snapshot metadata files.
    pub snapshots_dir: PathBuf,

    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store_api_url: require("STORE_API_URL")?,
            index_pointer_path: optional("INDEX_POINTER_PATH")
                .unwrap_or_else(|| "/cairn/index-pointer".to_string()),
            snapshot_interval: Duration::from_secs(
                60 * parse_or("SNAPSHOT_INTERVAL_MINUTES", 60u64)?,
            ),
            auto_snapshot: bool_or("AUTO_SNAPSHOT", true)?,
            batch_size: parse_or("BATCH_SIZE", 50)?,
            batch_timeout: Duration::from_millis(parse_or("BATCH_TIMEOUT_MS", 500u64)?),
            queue_capacity: parse_or("QUEUE_CAPACITY", 10_000)?,
            shutdown_grace: Duration::from_secs(parse_or("SHUTDOWN_GRACE_SECS", 60u64)?),
            snapshot_work_dir: optional("SNAPSHOT_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            snapshots_dir: optional("SNAPSHOTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./snapshots")),
            port: parse_or("PORT", 3000u16)?,
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn bool_or(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional(var) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value }),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_parsing() {
        assert!(bool_or("CAIRN_TEST_UNSET_BOOL", true).unwrap());
        std::env::set_var("CAIRN_TEST_BOOL_A", "false");
        assert!(!bool_or("CAIRN_TEST_BOOL_A", true).unwrap());
        std::env::set_var("CAIRN_TEST_BOOL_B", "maybe");
        assert!(bool_or("CAIRN_TEST_BOOL_B", true).is_err());
    }

    #[test]
    fn test_numeric_parsing() {
        assert_eq!(parse_or("CAIRN_TEST_UNSET_NUM", 50usize).unwrap(), 50);
        std::env::set_var("CAIRN_TEST_NUM_A", "25");
        assert_eq!(parse_or("CAIRN_TEST_NUM_A", 50usize).unwrap(), 25);
        std::env::set_var("CAIRN_TEST_NUM_B", "not-a-number");
        assert!(parse_or("CAIRN_TEST_NUM_B", 50usize).is_err());
    }
}
