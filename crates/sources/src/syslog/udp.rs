//! Syslog UDP Listener
//!
//! Receives syslog datagrams on a single UDP port, hands each one to the
//! registered handlers and optionally relays the raw bytes to a second UDP
//! destination.
//!
//! # Design
//!
//! Two nested loops run on one worker:
//! - The outer loop owns the socket lifecycle. It binds, and when the bind
//!   or the socket fails it reports the error, waits with exponential backoff
//!   and binds a fresh socket. It gives up after a fixed number of
//!   consecutive failures.
//! - The inner loop receives one datagram at a time, decodes it as UTF-8
//!   (lossy), notifies handlers in order and forwards it. Per-datagram
//!   faults are reported and the loop continues.
//!
//! Cancellation is raced against every receive and every pause, so shutdown
//! never waits for another datagram to arrive.
//!
//! # Example
//!
//! ```ignore
//! let config = SyslogUdpListenerConfig::with_port(514)
//!     .with_forward_target("127.0.0.1:49515");
//!
//! let (handler, mut events) = ChannelHandler::new();
//! let listener = SyslogUdpListener::new(config).with_handler(handler);
//!
//! let cancel = CancellationToken::new();
//! let reason = listener.run(cancel.clone()).await;
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::syslog::backoff::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES, RetryState};
use crate::syslog::event::{
    Handlers, ListenerError, ListenerHandler, ReceivedMessage, ShutdownReason,
};
use crate::syslog::forward::{ForwardOutcome, Forwarder};

// =============================================================================
// Constants
// =============================================================================

/// Default syslog port (privileged - may need root)
const DEFAULT_PORT: u16 = 514;

/// Largest payload a UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Default maximum syslog message size (any legal datagram)
const DEFAULT_MAX_MESSAGE_SIZE: usize = MAX_DATAGRAM_SIZE;

/// Default socket receive buffer size (64KB)
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default pause between receives
const DEFAULT_YIELD_INTERVAL: Duration = Duration::from_millis(23);

// =============================================================================
// Configuration
// =============================================================================

/// Syslog UDP listener configuration
#[derive(Debug, Clone)]
pub struct SyslogUdpListenerConfig {
    /// Listener identifier for logs and metrics
    pub id: String,

    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Relay destination as `host:port`; `None` disables forwarding
    pub forward_target: Option<String>,

    /// Maximum syslog message size; values above [`MAX_DATAGRAM_SIZE`]
    /// are treated as [`MAX_DATAGRAM_SIZE`]
    pub max_message_size: usize,

    /// Requested socket receive buffer size
    pub buffer_size: usize,

    /// First rebind delay; doubles with each consecutive failure
    pub backoff_base: Duration,

    /// Consecutive socket failures tolerated before giving up
    pub max_retries: u32,

    /// Pause after each receive (zero yields to the scheduler only)
    pub yield_interval: Duration,
}

impl Default for SyslogUdpListenerConfig {
    fn default() -> Self {
        Self {
            id: "syslog_udp".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            forward_target: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_retries: DEFAULT_MAX_RETRIES,
            yield_interval: DEFAULT_YIELD_INTERVAL,
        }
    }
}

impl SyslogUdpListenerConfig {
    /// Create config with custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the relay destination
    #[must_use]
    pub fn with_forward_target(mut self, target: impl Into<String>) -> Self {
        self.forward_target = Some(target.into());
        self
    }

    /// Socket address to bind to, if the address is an IP
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.address
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Size limit actually enforced on received datagrams
    pub fn message_size_limit(&self) -> usize {
        self.max_message_size.min(MAX_DATAGRAM_SIZE)
    }

    /// Printable bind address
    pub fn bind_address(&self) -> String {
        match self.socket_addr() {
            Some(addr) => addr.to_string(),
            None => format!("{}:{}", self.address, self.port),
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Syslog UDP listener metrics
#[derive(Debug, Default)]
pub struct SyslogUdpListenerMetrics {
    /// Datagrams dispatched to handlers
    pub packets_received: AtomicU64,

    /// Payload bytes dispatched to handlers
    pub bytes_received: AtomicU64,

    /// Datagrams rejected for exceeding the size limit
    pub messages_oversized: AtomicU64,

    /// All errors reported to handlers
    pub errors: AtomicU64,

    /// Sockets successfully bound (first bind plus rebinds)
    pub sockets_bound: AtomicU64,

    /// Failed bind attempts
    pub bind_failures: AtomicU64,

    /// Datagrams relayed to the forward target
    pub packets_forwarded: AtomicU64,

    /// Bytes relayed to the forward target
    pub bytes_forwarded: AtomicU64,

    /// Failed forward attempts (swallowed)
    pub forward_failures: AtomicU64,

    /// Forward sockets created (first use plus recreations)
    pub forward_sockets_created: AtomicU64,

    /// Set when a configured forward target could not be used
    pub forward_disabled: AtomicBool,
}

impl SyslogUdpListenerMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_oversized: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            sockets_bound: AtomicU64::new(0),
            bind_failures: AtomicU64::new(0),
            packets_forwarded: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
            forward_failures: AtomicU64::new(0),
            forward_sockets_created: AtomicU64::new(0),
            forward_disabled: AtomicBool::new(false),
        }
    }

    /// Record a packet received
    #[inline]
    pub fn packet_received(&self, bytes: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an oversized datagram
    #[inline]
    pub fn message_oversized(&self) {
        self.messages_oversized.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error reported to handlers
    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn socket_bound(&self) {
        self.sockets_bound.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bind_failed(&self) {
        self.bind_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one forwarding attempt
    pub(crate) fn forward_outcome(&self, outcome: ForwardOutcome) {
        match outcome {
            ForwardOutcome::Skipped => {}
            ForwardOutcome::Disabled => {
                self.forward_disabled.store(true, Ordering::Relaxed);
            }
            ForwardOutcome::Sent {
                bytes,
                socket_created,
            } => {
                if socket_created {
                    self.forward_sockets_created.fetch_add(1, Ordering::Relaxed);
                }
                self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
                self.bytes_forwarded
                    .fetch_add(bytes as u64, Ordering::Relaxed);
            }
            ForwardOutcome::Failed { socket_created } => {
                if socket_created {
                    self.forward_sockets_created.fetch_add(1, Ordering::Relaxed);
                }
                self.forward_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> SyslogUdpMetricsSnapshot {
        SyslogUdpMetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_oversized: self.messages_oversized.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            sockets_bound: self.sockets_bound.load(Ordering::Relaxed),
            bind_failures: self.bind_failures.load(Ordering::Relaxed),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            forward_sockets_created: self.forward_sockets_created.load(Ordering::Relaxed),
            forward_disabled: self.forward_disabled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of listener metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyslogUdpMetricsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub messages_oversized: u64,
    pub errors: u64,
    pub sockets_bound: u64,
    pub bind_failures: u64,
    pub packets_forwarded: u64,
    pub bytes_forwarded: u64,
    pub forward_failures: u64,
    pub forward_sockets_created: u64,
    pub forward_disabled: bool,
}

/// Handle for reading listener metrics while it runs
#[derive(Clone)]
pub struct SyslogUdpMetricsHandle {
    id: String,
    metrics: Arc<SyslogUdpListenerMetrics>,
}

impl SyslogUdpMetricsHandle {
    pub fn listener_id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> SyslogUdpMetricsSnapshot {
        self.metrics.snapshot()
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Syslog UDP listener
///
/// Configure and register handlers first, then call [`run`](Self::run) on a
/// single task. All sockets and retry state live inside `run`.
pub struct SyslogUdpListener {
    /// Configuration
    config: SyslogUdpListenerConfig,

    /// Notification consumers, in registration order
    handlers: Handlers,

    /// Metrics
    metrics: Arc<SyslogUdpListenerMetrics>,

    /// Running flag
    running: Arc<AtomicBool>,

    /// Receive errors injected ahead of the next `recv_from`
    #[cfg(test)]
    recv_faults: std::sync::Mutex<std::collections::VecDeque<io::ErrorKind>>,
}

impl SyslogUdpListener {
    /// Create a new listener with no handlers
    pub fn new(config: SyslogUdpListenerConfig) -> Self {
        Self {
            config,
            handlers: Handlers::new(),
            metrics: Arc::new(SyslogUdpListenerMetrics::new()),
            running: Arc::new(AtomicBool::new(false)),
            #[cfg(test)]
            recv_faults: Default::default(),
        }
    }

    /// Register a handler (builder style)
    #[must_use]
    pub fn with_handler(mut self, handler: impl ListenerHandler + 'static) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register a handler
    pub fn add_handler(&mut self, handler: impl ListenerHandler + 'static) {
        self.handlers.push(handler);
    }

    /// Replace the relay destination used by the next run
    pub fn set_forward_target(&mut self, target: Option<String>) {
        self.config.forward_target = target;
    }

    pub fn config(&self) -> &SyslogUdpListenerConfig {
        &self.config
    }

    /// Get metrics reference
    pub fn metrics(&self) -> &Arc<SyslogUdpListenerMetrics> {
        &self.metrics
    }

    /// Get a metrics handle for reporting
    pub fn metrics_handle(&self) -> SyslogUdpMetricsHandle {
        SyslogUdpMetricsHandle {
            id: self.config.id.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Check if the receive loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Run until cancelled or until the consecutive failure cap is reached
    pub async fn run(&self, cancel: CancellationToken) -> ShutdownReason {
        let bind_addr = self.config.bind_address();

        self.running.store(true, Ordering::Relaxed);

        tracing::info!(
            listener_id = %self.config.id,
            address = %bind_addr,
            forward_target = ?self.config.forward_target,
            max_message_size = %self.config.message_size_limit(),
            "syslog UDP listener starting"
        );

        if self.handlers.is_empty() {
            tracing::warn!(
                listener_id = %self.config.id,
                "syslog UDP listener has no handlers, messages are only forwarded"
            );
        }

        let mut retry = RetryState::new(self.config.backoff_base, self.config.max_retries);
        let mut forwarder = Forwarder::new(self.config.forward_target.clone());

        let reason = loop {
            if cancel.is_cancelled() {
                break ShutdownReason::Cancelled;
            }

            let error = match self.bind_socket(&bind_addr) {
                Ok(socket) => {
                    self.metrics.socket_bound();
                    tracing::info!(
                        listener_id = %self.config.id,
                        local_addr = ?socket.local_addr().ok(),
                        "syslog UDP listener bound"
                    );

                    match self
                        .receive(&socket, &cancel, &mut retry, &mut forwarder)
                        .await
                    {
                        Ok(()) => break ShutdownReason::Cancelled,
                        Err(e) => e,
                    }
                }
                Err(e) => {
                    self.metrics.bind_failed();
                    e
                }
            };

            self.report_error(&error);

            let Some(delay) = retry.record_failure() else {
                tracing::error!(
                    listener_id = %self.config.id,
                    failures = retry.failures(),
                    "syslog UDP listener giving up after consecutive failures"
                );
                break ShutdownReason::RetriesExhausted;
            };

            tracing::debug!(
                listener_id = %self.config.id,
                failures = retry.failures(),
                delay_ms = delay.as_millis() as u64,
                "syslog UDP listener rebinding after backoff"
            );

            let cancelled = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                break ShutdownReason::Cancelled;
            }
        };

        self.running.store(false, Ordering::Relaxed);

        tracing::info!(
            listener_id = %self.config.id,
            reason = reason.as_str(),
            "syslog UDP listener stopped"
        );

        reason
    }

    /// Inner loop: receive and dispatch until cancelled or the socket fails
    async fn receive(
        &self,
        socket: &UdpSocket,
        cancel: &CancellationToken,
        retry: &mut RetryState,
        forwarder: &mut Forwarder,
    ) -> Result<(), ListenerError> {
        // One spare byte so an oversized datagram is detectable
        let mut recv_buf = vec![0u8; self.config.message_size_limit() + 1];

        loop {
            let recv_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.recv_datagram(socket, &mut recv_buf) => Some(result),
            };
            let Some(recv_result) = recv_result else {
                return Ok(());
            };

            match recv_result {
                Ok((len, peer_addr)) => {
                    retry.reset();
                    self.process_packet(&recv_buf[..len], peer_addr, forwarder)
                        .await;
                }
                Err(e) if is_transient(&e) => {
                    self.report_error(&ListenerError::RecvTransient(e));
                }
                Err(e) => return Err(ListenerError::Recv(e)),
            }

            if self.pause(cancel).await {
                return Ok(());
            }
        }
    }

    async fn recv_datagram(
        &self,
        socket: &UdpSocket,
        buf: &mut [u8],
    ) -> io::Result<(usize, SocketAddr)> {
        #[cfg(test)]
        if let Some(kind) = self
            .recv_faults
            .lock()
            .ok()
            .and_then(|mut faults| faults.pop_front())
        {
            return Err(io::Error::new(kind, "injected receive fault"));
        }

        socket.recv_from(buf).await
    }

    /// Dispatch one datagram to handlers, then forward it
    async fn process_packet(&self, data: &[u8], peer_addr: SocketAddr, forwarder: &mut Forwarder) {
        let limit = self.config.message_size_limit();
        if data.len() > limit {
            self.metrics.message_oversized();
            tracing::debug!(
                listener_id = %self.config.id,
                peer = %peer_addr,
                max = limit,
                "syslog UDP packet too large, dropping"
            );
            self.report_error(&ListenerError::PacketTooLarge { limit });
            return;
        }

        self.metrics.packet_received(data.len() as u64);

        let message = ReceivedMessage::from_datagram(data, peer_addr);
        for error in self.handlers.dispatch_message(message) {
            self.report_error(&error);
        }

        let outcome = forwarder.forward(data).await;
        self.metrics.forward_outcome(outcome);
    }

    /// Pause between receives; returns true if cancelled meanwhile
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        if self.config.yield_interval.is_zero() {
            tokio::task::yield_now().await;
            return cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.config.yield_interval) => false,
        }
    }

    fn report_error(&self, error: &ListenerError) {
        self.metrics.error();

        if error.is_fatal() {
            tracing::warn!(
                listener_id = %self.config.id,
                error = %error,
                "syslog UDP listener socket failure"
            );
        } else {
            tracing::debug!(
                listener_id = %self.config.id,
                error = %error,
                "syslog UDP listener error"
            );
        }

        self.handlers.dispatch_error(error);
    }

    fn bind_socket(&self, bind_addr: &str) -> Result<UdpSocket, ListenerError> {
        let addr = self
            .config
            .socket_addr()
            .ok_or_else(|| ListenerError::InvalidAddress {
                address: bind_addr.into(),
            })?;

        create_socket(addr, self.config.buffer_size).map_err(|source| ListenerError::Bind {
            address: bind_addr.into(),
            source,
        })
    }
}

/// Create a bound, non-blocking UDP socket
///
/// No `SO_REUSEADDR`/`SO_REUSEPORT`: a second bind of the same port fails,
/// so at most one receive socket owns it.
fn create_socket(addr: SocketAddr, recv_buffer_size: usize) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
        tracing::warn!(
            error = %e,
            requested_size = recv_buffer_size,
            "Failed to set UDP SO_RCVBUF"
        );
    }

    socket.bind(&addr.into())?;

    // Set non-blocking for tokio
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// Receive errors that leave the socket usable
///
/// `ConnectionReset`/`ConnectionRefused` surface ICMP port-unreachable
/// replies on some platforms.
pub(crate) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
#[path = "udp_test.rs"]
mod udp_test;
