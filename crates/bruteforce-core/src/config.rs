//! Failure guard configuration
//!
//! The guard is disabled by default; deployments opt in and tune the
//! window/threshold to their proxy's retry behavior.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure guard configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Whether the guard is active. When false, `is_blocked` is always
    /// false and `record_failure` is a no-op.
    pub enabled: bool,

    /// Failures within the window before an address is blocked
    pub max_failures: u32,

    /// Window duration in seconds, measured from the FIRST failure
    pub window_seconds: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_failures: 3,
            window_seconds: 10,
        }
    }
}

impl GuardConfig {
    /// Window duration as a `Duration`
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.window(), Duration::from_secs(10));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: GuardConfig =
            serde_json::from_str(r#"{"enabled": true, "window_seconds": 60}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.window_seconds, 60);
    }
}
