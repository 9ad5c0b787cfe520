//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults; nothing is required.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::actors::CoordinatorSettings;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4100";

/// Default idle threshold before a connection is swept, in seconds.
pub const DEFAULT_STALE_AFTER_SECONDS: u64 = 45;

/// Default liveness sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 15;

/// Default buffering auto-recovery deadline in seconds.
pub const DEFAULT_BUFFER_RECOVERY_SECONDS: u64 = 10;

/// Default RC instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Room Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket server bind address (default: "0.0.0.0:4100").
    pub bind_address: String,

    /// Unique identifier for this RC instance.
    pub rc_id: String,

    /// Idle time after which a connection is force-disconnected (default: 45).
    pub stale_after_seconds: u64,

    /// Liveness sweep interval (default: 15).
    pub sweep_interval_seconds: u64,

    /// Buffering auto-recovery deadline (default: 10).
    pub buffer_recovery_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let stale_after_seconds = parse_seconds(vars, "RC_STALE_AFTER_SECONDS")?
            .unwrap_or(DEFAULT_STALE_AFTER_SECONDS);

        let sweep_interval_seconds = parse_seconds(vars, "RC_SWEEP_INTERVAL_SECONDS")?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS);

        let buffer_recovery_seconds = parse_seconds(vars, "RC_BUFFER_RECOVERY_SECONDS")?
            .unwrap_or(DEFAULT_BUFFER_RECOVERY_SECONDS);

        // Generate RC instance ID
        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            rc_id,
            stale_after_seconds,
            sweep_interval_seconds,
            buffer_recovery_seconds,
        })
    }

    /// Coordinator timing knobs derived from this configuration.
    #[must_use]
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            stale_after: Duration::from_secs(self.stale_after_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            recovery_after: Duration::from_secs(self.buffer_recovery_seconds),
        }
    }
}

fn parse_seconds(vars: &HashMap<String, String>, key: &str) -> Result<Option<u64>, ConfigError> {
    match vars.get(key) {
        None => Ok(None),
        Some(raw) => {
            let value: u64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}")))?;
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{key} must be positive"
                )));
            }
            Ok(Some(value))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = HashMap::new();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.stale_after_seconds, DEFAULT_STALE_AFTER_SECONDS);
        assert_eq!(config.sweep_interval_seconds, DEFAULT_SWEEP_INTERVAL_SECONDS);
        assert_eq!(config.buffer_recovery_seconds, DEFAULT_BUFFER_RECOVERY_SECONDS);
        // RC ID should be auto-generated
        assert!(config.rc_id.starts_with("rc-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("RC_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            ("RC_STALE_AFTER_SECONDS".to_string(), "90".to_string()),
            ("RC_SWEEP_INTERVAL_SECONDS".to_string(), "30".to_string()),
            ("RC_BUFFER_RECOVERY_SECONDS".to_string(), "5".to_string()),
            ("RC_ID".to_string(), "rc-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.stale_after_seconds, 90);
        assert_eq!(config.sweep_interval_seconds, 30);
        assert_eq!(config.buffer_recovery_seconds, 5);
        assert_eq!(config.rc_id, "rc-custom-001");
    }

    #[test]
    fn test_from_vars_rejects_invalid_seconds() {
        let vars = HashMap::from([("RC_STALE_AFTER_SECONDS".to_string(), "soon".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let vars = HashMap::from([("RC_SWEEP_INTERVAL_SECONDS".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_coordinator_settings_conversion() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        let settings = config.coordinator_settings();

        assert_eq!(settings.stale_after, Duration::from_secs(45));
        assert_eq!(settings.sweep_interval, Duration::from_secs(15));
        assert_eq!(settings.recovery_after, Duration::from_secs(10));
    }
}
