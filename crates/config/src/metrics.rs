//! Metrics reporting configuration
//!
//! Controls periodic logging of listener counters.
//!
//! # Defaults
//!
//! - `enabled`: true
//! - `interval`: 60s

use serde::Deserialize;
use std::time::Duration;

/// Metrics configuration
///
/// # Example
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "60s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics reporting
    /// Default: true
    pub enabled: bool,

    /// Reporting interval
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_empty() {
        let config: MetricsConfig = toml::from_str("").unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_disabled() {
        let config: MetricsConfig = toml::from_str("enabled = false").unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_deserialize_interval_variants() {
        for (s, expected) in [
            ("100ms", Duration::from_millis(100)),
            ("1s", Duration::from_secs(1)),
            ("30s", Duration::from_secs(30)),
            ("5m", Duration::from_secs(300)),
        ] {
            let toml = format!("interval = \"{}\"", s);
            let config: MetricsConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.interval, expected, "Failed for {}", s);
        }
    }
}
