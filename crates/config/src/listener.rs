//! Listener configuration
//!
//! Settings for the syslog UDP listener and its optional relay target.

use serde::Deserialize;
use std::time::Duration;

/// Largest payload a UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Syslog UDP listener configuration
///
/// Receives syslog messages over UDP (RFC 3164 / RFC 5424).
///
/// # Example
///
/// ```toml
/// [listener]
/// port = 514
/// forward_target = "127.0.0.1:49515"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address
    /// Default: "0.0.0.0"
    pub address: String,

    /// Listen port (1-65535)
    /// Default: 514
    pub port: u16,

    /// Relay destination as `host:port`
    /// Default: none (no forwarding)
    pub forward_target: Option<String>,

    /// Maximum syslog message size (1-65535)
    /// Default: 65535 (any UDP datagram)
    pub max_message_size: usize,

    /// Socket receive buffer size (bytes)
    /// Default: 65536
    pub buffer_size: usize,

    /// First rebind delay, doubled per consecutive failure
    /// Default: 333ms
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Consecutive socket failures before the listener gives up
    /// Default: 5
    pub max_retries: u32,

    /// Pause after each received datagram
    /// Default: 23ms
    #[serde(with = "humantime_serde")]
    pub yield_interval: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 514,
            forward_target: None,
            max_message_size: MAX_DATAGRAM_SIZE,
            buffer_size: 64 * 1024,
            backoff_base: Duration::from_millis(333),
            max_retries: 5,
            yield_interval: Duration::from_millis(23),
        }
    }
}
