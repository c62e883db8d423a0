//! sysrelay - Sources
//!
//! UDP syslog listener that republishes every datagram to registered
//! handlers and optionally relays it, unmodified, to a second destination.
//!
//! # Design Principles
//!
//! - **Single worker**: one task owns the receive socket, the forward socket
//!   and the retry state; nothing is shared but atomic metrics
//! - **Async I/O**: Built on `tokio`; cancellation via `CancellationToken`
//! - **Crash isolation**: per-datagram faults and handler panics are reported
//!   and the loop continues; socket faults trigger a rebind with backoff
//! - **Fail-soft forwarding**: relay failures never reach handlers
//!
//! # Example
//!
//! ```ignore
//! use sysrelay_sources::{ChannelHandler, SyslogUdpListener, SyslogUdpListenerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SyslogUdpListenerConfig::with_port(1514);
//! let (handler, mut events) = ChannelHandler::new();
//! let listener = SyslogUdpListener::new(config).with_handler(handler);
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(async move { listener.run(cancel).await });
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod syslog;

pub use syslog::{
    ChannelHandler, FnHandler, ForwardTarget, ForwardTargetError, Handlers, ListenerError,
    ListenerEvent, ListenerHandler, MAX_DATAGRAM_SIZE, ReceivedMessage, RetryState,
    ShutdownReason, SyslogUdpListener, SyslogUdpListenerConfig, SyslogUdpListenerMetrics,
    SyslogUdpMetricsHandle, SyslogUdpMetricsSnapshot,
};
