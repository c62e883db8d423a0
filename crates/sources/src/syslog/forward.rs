//! Datagram Forwarding
//!
//! Relays every received datagram, byte for byte, to one secondary UDP
//! destination (typically a local relay).
//!
//! # Behavior
//!
//! - The `host:port` target is resolved once per run, on the first datagram.
//!   If it is malformed or does not resolve, forwarding stays off for the
//!   rest of the run.
//! - The sending socket is created on first use and reused afterwards.
//! - A failed send drops the socket; the next datagram creates a new one.
//! - Nothing here is ever reported to listener handlers, and nothing here
//!   backs off.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use tokio::net::UdpSocket;

// =============================================================================
// Target
// =============================================================================

/// Parsed `host:port` forward destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub host: String,
    pub port: u16,
}

/// Why a forward target string was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardTargetError {
    /// Not exactly two `:`-separated parts, or an empty host
    #[error("forward target '{target}' is not in host:port form")]
    Format { target: String },

    /// Port segment is not a number in 0-65535
    #[error("forward target '{target}' has invalid port '{port}'")]
    Port { target: String, port: String },
}

impl ForwardTarget {
    /// Parse a `host:port` string
    ///
    /// The string must split into exactly two parts on `:`, so bare IPv6
    /// literals are rejected. No whitespace is stripped.
    pub fn parse(target: &str) -> Result<Self, ForwardTargetError> {
        let parts: Vec<&str> = target.split(':').collect();

        let [host, port] = parts.as_slice() else {
            return Err(ForwardTargetError::Format {
                target: target.into(),
            });
        };

        if host.is_empty() {
            return Err(ForwardTargetError::Format {
                target: target.into(),
            });
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ForwardTargetError::Port {
                target: target.into(),
                port: (*port).into(),
            })?;

        Ok(Self {
            host: (*host).into(),
            port,
        })
    }

    /// Resolve to a socket address (IP literal, else DNS; first result wins)
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {}", self.host),
                )
            })
    }
}

impl FromStr for ForwardTarget {
    type Err = ForwardTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Forwarder
// =============================================================================

/// Result of one forwarding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ForwardOutcome {
    /// No target configured
    Skipped,
    /// Target configured but unusable for this run
    Disabled,
    /// Datagram relayed; `socket_created` is set when the socket was (re)built
    Sent { bytes: usize, socket_created: bool },
    /// Socket creation or send failed; socket discarded
    Failed { socket_created: bool },
}

enum ForwardState {
    Unresolved,
    Resolved {
        addr: SocketAddr,
        socket: Option<UdpSocket>,
    },
    Disabled,
}

/// Per-run forwarding state, owned by the receive worker
pub(crate) struct Forwarder {
    target: Option<String>,
    state: ForwardState,
}

impl Forwarder {
    pub(crate) fn new(target: Option<String>) -> Self {
        Self {
            target,
            state: ForwardState::Unresolved,
        }
    }

    /// Relay one datagram
    pub(crate) async fn forward(&mut self, payload: &[u8]) -> ForwardOutcome {
        let Some(target) = self.target.as_deref() else {
            return ForwardOutcome::Skipped;
        };

        if matches!(self.state, ForwardState::Unresolved) {
            self.state = resolve_state(target).await;
        }

        let ForwardState::Resolved { addr, socket } = &mut self.state else {
            return ForwardOutcome::Disabled;
        };
        let addr = *addr;

        let mut socket_created = false;
        if socket.is_none() {
            match UdpSocket::bind(unspecified_for(addr)).await {
                Ok(s) => {
                    *socket = Some(s);
                    socket_created = true;
                }
                Err(e) => {
                    tracing::debug!(
                        destination = %addr,
                        error = %e,
                        "syslog forward socket creation failed"
                    );
                    return ForwardOutcome::Failed { socket_created };
                }
            }
        }

        let result = match socket.as_ref() {
            Some(s) => s.send_to(payload, addr).await,
            None => return ForwardOutcome::Failed { socket_created },
        };

        match result {
            Ok(bytes) => ForwardOutcome::Sent {
                bytes,
                socket_created,
            },
            Err(e) => {
                *socket = None;
                tracing::debug!(
                    destination = %addr,
                    error = %e,
                    "syslog forward failed, socket discarded"
                );
                ForwardOutcome::Failed { socket_created }
            }
        }
    }
}

async fn resolve_state(target: &str) -> ForwardState {
    let parsed = match ForwardTarget::parse(target) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "syslog forwarding disabled");
            return ForwardState::Disabled;
        }
    };

    match parsed.resolve().await {
        Ok(addr) => {
            tracing::info!(
                forward_target = %parsed,
                destination = %addr,
                "syslog forwarding enabled"
            );
            ForwardState::Resolved { addr, socket: None }
        }
        Err(e) => {
            tracing::warn!(
                forward_target = %parsed,
                error = %e,
                "syslog forward target did not resolve, forwarding disabled"
            );
            ForwardState::Disabled
        }
    }
}

fn unspecified_for(addr: SocketAddr) -> SocketAddr {
    let ip: IpAddr = if addr.is_ipv4() {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        Ipv6Addr::UNSPECIFIED.into()
    };
    SocketAddr::new(ip, 0)
}

#[cfg(test)]
#[path = "forward_test.rs"]
mod forward_test;
