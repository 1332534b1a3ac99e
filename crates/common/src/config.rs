//! Common configuration types for Huddle components.

use serde::{Deserialize, Serialize};

/// Default log filter directive when neither `RUST_LOG` nor a configured level is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `info`, `media_session=debug,room_service=info`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Build from a log level variable and a JSON toggle variable value.
    ///
    /// The JSON toggle accepts `1`, `true` and `yes` (case-insensitive).
    #[must_use]
    pub fn from_values(log_level: Option<&String>, json_logs: Option<&String>) -> Self {
        let log_level = log_level
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let json_logs = json_logs
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            log_level,
            json_logs,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_defaults() {
        let config = ObservabilityConfig::from_values(None, None);
        assert_eq!(config, ObservabilityConfig::default());
    }

    #[test]
    fn test_from_values_json_toggle() {
        let level = "debug".to_string();
        let on = "TRUE".to_string();
        let config = ObservabilityConfig::from_values(Some(&level), Some(&on));
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);

        let off = "no".to_string();
        let config = ObservabilityConfig::from_values(Some(&level), Some(&off));
        assert!(!config.json_logs);
    }

    #[test]
    fn test_blank_level_falls_back() {
        let blank = "  ".to_string();
        let config = ObservabilityConfig::from_values(Some(&blank), None);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }
}
