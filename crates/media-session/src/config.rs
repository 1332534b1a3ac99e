//! Media session configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; values that are present but malformed are rejected.

use common::config::ObservabilityConfig;
use rand::Rng;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Room joined when none is configured.
pub const DEFAULT_ROOM_ID: &str = "default-room";

/// Default bound on every signaling request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default period of the consumer health/recovery loop.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 5_000;

/// Default delay between a consumer's first playback attempt and its settle check.
pub const DEFAULT_PLAYBACK_SETTLE_MS: u64 = 2_000;

/// Default keep-alive ping period while backgrounded.
pub const DEFAULT_KEEPALIVE_INTERVAL_SECONDS: u64 = 10;

/// Accepted keep-alive ping period range, in seconds.
pub const MIN_KEEPALIVE_INTERVAL_SECONDS: u64 = 10;
pub const MAX_KEEPALIVE_INTERVAL_SECONDS: u64 = 30;

/// Default gain of the near-silent keep-alive audio signal.
pub const DEFAULT_KEEPALIVE_GAIN: f32 = 0.001;

/// Prefix of generated display names.
pub const GENERATED_NAME_PREFIX: &str = "User-";

/// Media session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Room to join (default: "default-room").
    pub room_id: String,

    /// Local participant display name (generated `User-<n>` if absent).
    pub display_name: String,

    /// Upper bound on every signaling request (default: 10s).
    pub request_timeout: Duration,

    /// Consumer health/recovery loop period (default: 5s).
    pub health_check_interval: Duration,

    /// Delay before the post-resume playback settle check (default: 2s).
    pub playback_settle_delay: Duration,

    /// Keep-alive ping period while backgrounded (default: 10s, range 10-30s).
    pub keepalive_interval: Duration,

    /// Gain of the keep-alive audio signal (default: 0.001).
    pub keepalive_gain: f32,

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
            room_id: DEFAULT_ROOM_ID.to_string(),
            display_name: generate_display_name(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            health_check_interval: Duration::from_millis(DEFAULT_HEALTH_CHECK_INTERVAL_MS),
            playback_settle_delay: Duration::from_millis(DEFAULT_PLAYBACK_SETTLE_MS),
            keepalive_interval: Duration::from_secs(DEFAULT_KEEPALIVE_INTERVAL_SECONDS),
            keepalive_gain: DEFAULT_KEEPALIVE_GAIN,
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
        let room_id = vars
            .get("SESSION_ROOM_ID")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());

        let display_name = vars
            .get("SESSION_DISPLAY_NAME")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(generate_display_name);

        let request_timeout_ms: u64 = parse_var(
            vars,
            "SESSION_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        let health_check_interval_ms: u64 = parse_var(
            vars,
            "SESSION_HEALTH_CHECK_INTERVAL_MS",
            DEFAULT_HEALTH_CHECK_INTERVAL_MS,
        )?;
        let playback_settle_ms: u64 =
            parse_var(vars, "SESSION_PLAYBACK_SETTLE_MS", DEFAULT_PLAYBACK_SETTLE_MS)?;

        for (name, value) in [
            ("SESSION_REQUEST_TIMEOUT_MS", request_timeout_ms),
            ("SESSION_HEALTH_CHECK_INTERVAL_MS", health_check_interval_ms),
            ("SESSION_PLAYBACK_SETTLE_MS", playback_settle_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let keepalive_interval_seconds: u64 = parse_var(
            vars,
            "SESSION_KEEPALIVE_INTERVAL_SECONDS",
            DEFAULT_KEEPALIVE_INTERVAL_SECONDS,
        )?;
        if !(MIN_KEEPALIVE_INTERVAL_SECONDS..=MAX_KEEPALIVE_INTERVAL_SECONDS)
            .contains(&keepalive_interval_seconds)
        {
            return Err(ConfigError::InvalidValue(format!(
                "SESSION_KEEPALIVE_INTERVAL_SECONDS must be between \
                 {MIN_KEEPALIVE_INTERVAL_SECONDS} and {MAX_KEEPALIVE_INTERVAL_SECONDS}, \
                 got {keepalive_interval_seconds}"
            )));
        }

        let keepalive_gain: f32 = parse_var(vars, "SESSION_KEEPALIVE_GAIN", DEFAULT_KEEPALIVE_GAIN)?;
        if !(keepalive_gain > 0.0 && keepalive_gain <= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "SESSION_KEEPALIVE_GAIN must be in (0, 1], got {keepalive_gain}"
            )));
        }

        let observability = ObservabilityConfig::from_values(
            vars.get("SESSION_LOG_LEVEL"),
            vars.get("SESSION_JSON_LOGS"),
        );

        Ok(Config {
            room_id,
            display_name,
            request_timeout: Duration::from_millis(request_timeout_ms),
            health_check_interval: Duration::from_millis(health_check_interval_ms),
            playback_settle_delay: Duration::from_millis(playback_settle_ms),
            keepalive_interval: Duration::from_secs(keepalive_interval_seconds),
            keepalive_gain,
            observability,
        })
    }
}

/// Generate a display name of the form `User-<n>`, `n` in `0..1000`.
#[must_use]
pub fn generate_display_name() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{GENERATED_NAME_PREFIX}{n}")
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.room_id, DEFAULT_ROOM_ID);
        assert!(config.display_name.starts_with(GENERATED_NAME_PREFIX));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.playback_settle_delay, Duration::from_secs(2));
        assert_eq!(config.keepalive_interval, Duration::from_secs(10));
        assert!((config.keepalive_gain - DEFAULT_KEEPALIVE_GAIN).abs() < f32::EPSILON);
        assert_eq!(config.observability, ObservabilityConfig::default());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("SESSION_ROOM_ID".to_string(), "standup".to_string()),
            ("SESSION_DISPLAY_NAME".to_string(), "Alice".to_string()),
            ("SESSION_REQUEST_TIMEOUT_MS".to_string(), "2500".to_string()),
            ("SESSION_HEALTH_CHECK_INTERVAL_MS".to_string(), "1000".to_string()),
            ("SESSION_PLAYBACK_SETTLE_MS".to_string(), "500".to_string()),
            ("SESSION_KEEPALIVE_INTERVAL_SECONDS".to_string(), "30".to_string()),
            ("SESSION_KEEPALIVE_GAIN".to_string(), "0.01".to_string()),
            ("SESSION_LOG_LEVEL".to_string(), "debug".to_string()),
            ("SESSION_JSON_LOGS".to_string(), "true".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.room_id, "standup");
        assert_eq!(config.display_name, "Alice");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.health_check_interval, Duration::from_secs(1));
        assert_eq!(config.playback_settle_delay, Duration::from_millis(500));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_keepalive_interval_out_of_range() {
        for value in ["9", "31"] {
            let vars = HashMap::from([(
                "SESSION_KEEPALIVE_INTERVAL_SECONDS".to_string(),
                value.to_string(),
            )]);
            let result = Config::from_vars(&vars);
            assert!(matches!(result, Err(ConfigError::InvalidValue(_))), "{value}");
        }
    }

    #[test]
    fn test_malformed_number_rejected() {
        let vars = HashMap::from([(
            "SESSION_REQUEST_TIMEOUT_MS".to_string(),
            "soon".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("SESSION_REQUEST_TIMEOUT_MS"))
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let vars = HashMap::from([(
            "SESSION_HEALTH_CHECK_INTERVAL_MS".to_string(),
            "0".to_string(),
        )]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_gain_must_be_audible_range() {
        for value in ["0", "-0.5", "1.5"] {
            let vars = HashMap::from([("SESSION_KEEPALIVE_GAIN".to_string(), value.to_string())]);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn test_generated_display_name_range() {
        for _ in 0..50 {
            let name = generate_display_name();
            let n: u16 = name
                .strip_prefix(GENERATED_NAME_PREFIX)
                .unwrap()
                .parse()
                .unwrap();
            assert!(n < 1000);
        }
    }

    #[test]
    fn test_blank_display_name_is_generated() {
        let vars = HashMap::from([("SESSION_DISPLAY_NAME".to_string(), "  ".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.display_name.starts_with(GENERATED_NAME_PREFIX));
    }
}
