//! Configuration validation
//!
//! Checks values serde cannot express:
//! - Listener port is not 0
//! - Message size fits a UDP datagram, retry cap is positive
//! - Metrics interval is positive when reporting is enabled
//!
//! A malformed `forward_target` is deliberately not an error: the listener
//! disables forwarding for the run instead.

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::listener::MAX_DATAGRAM_SIZE;

/// Name used for the listener in validation errors
const LISTENER: &str = "syslog_udp";

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_listener(config)?;
    validate_metrics(config)?;
    Ok(())
}

fn validate_listener(config: &Config) -> Result<()> {
    let listener = &config.listener;

    if listener.port == 0 {
        return Err(ConfigError::invalid_value(
            "listener",
            LISTENER,
            "port",
            "must be 1-65535",
        ));
    }

    if listener.max_message_size == 0 || listener.max_message_size > MAX_DATAGRAM_SIZE {
        return Err(ConfigError::invalid_value(
            "listener",
            LISTENER,
            "max_message_size",
            "must be 1-65535",
        ));
    }

    if listener.max_retries == 0 {
        return Err(ConfigError::invalid_value(
            "listener",
            LISTENER,
            "max_retries",
            "must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_metrics(config: &Config) -> Result<()> {
    if config.metrics.enabled && config.metrics.interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "metrics",
            "metrics",
            "interval",
            "must be greater than 0 when enabled",
        ));
    }
    Ok(())
}
