//! Room service configuration.
//!
//! Configuration is loaded from environment variables with defaults.

use common::config::ObservabilityConfig;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Room used when a connection names none.
pub const DEFAULT_ROOM_ID: &str = "default-room";

/// Default maximum number of joined peers per room.
pub const DEFAULT_MAX_PEERS: usize = 50;

/// Room service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Room used when a connection names none (default: "default-room").
    pub default_room_id: String,

    /// Maximum joined peers per room (default: 50).
    pub max_peers: usize,

    /// Logging configuration.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_room_id: DEFAULT_ROOM_ID.to_string(),
            max_peers: DEFAULT_MAX_PEERS,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let default_room_id = vars
            .get("ROOM_DEFAULT_ID")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());

        let max_peers = match vars.get("ROOM_MAX_PEERS") {
            Some(value) => {
                let parsed: usize = value.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "ROOM_MAX_PEERS must be a valid positive integer, got '{value}': {e}"
                    ))
                })?;
                if parsed == 0 {
                    return Err(ConfigError::InvalidValue(
                        "ROOM_MAX_PEERS must be greater than 0".to_string(),
                    ));
                }
                parsed
            }
            None => DEFAULT_MAX_PEERS,
        };

        let observability = ObservabilityConfig::from_values(
            vars.get("ROOM_LOG_LEVEL"),
            vars.get("ROOM_JSON_LOGS"),
        );

        Ok(Config {
            default_room_id,
            max_peers,
            observability,
        })
    }
}
