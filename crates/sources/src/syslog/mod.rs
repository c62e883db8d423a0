//! Syslog Listener
//!
//! RFC 3164 / RFC 5424 syslog receiver over UDP.
//!
//! # Modules
//!
//! - **udp** - Socket lifecycle, receive loop, metrics
//! - **event** - Notification values and handlers
//! - **forward** - Lazy, fail-soft relay to a second UDP destination
//! - **backoff** - Consecutive-failure tracking for rebinds
//!
//! Messages are passed on raw - no syslog parsing happens here.

pub mod backoff;
pub mod event;
pub mod forward;
pub mod udp;

pub use backoff::RetryState;
pub use event::{
    ChannelHandler, FnHandler, Handlers, ListenerError, ListenerEvent, ListenerHandler,
    ReceivedMessage, ShutdownReason,
};
pub use forward::{ForwardTarget, ForwardTargetError};
pub use udp::{
    MAX_DATAGRAM_SIZE, SyslogUdpListener, SyslogUdpListenerConfig, SyslogUdpListenerMetrics,
    SyslogUdpMetricsHandle, SyslogUdpMetricsSnapshot,
};
