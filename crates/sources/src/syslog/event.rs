//! Listener Notifications
//!
//! Consumers register [`ListenerHandler`]s before the listener starts.
//! Every received datagram produces one [`ReceivedMessage`] and every caught
//! fault produces one [`ListenerError`].
//!
//! # Delivery
//!
//! Handlers are called synchronously from the receive worker, in
//! registration order. A slow handler stalls the receive loop. A panicking
//! handler is isolated: the panic is caught and reported as
//! [`ListenerError::HandlerPanicked`] while the loop keeps running.

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

// =============================================================================
// Values
// =============================================================================

/// A single syslog datagram, decoded as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Payload decoded as UTF-8 (invalid sequences replaced, never rejected)
    pub message: String,

    /// Sender of the datagram
    pub remote: SocketAddr,

    /// Time the datagram was taken off the socket
    pub received_at: DateTime<Utc>,
}

impl ReceivedMessage {
    /// Build a message from raw datagram bytes, stamped with the current time
    pub fn from_datagram(payload: &[u8], remote: SocketAddr) -> Self {
        Self {
            message: String::from_utf8_lossy(payload).into_owned(),
            remote,
            received_at: Utc::now(),
        }
    }
}

/// Faults reported to consumers
///
/// Socket lifecycle faults ([`is_fatal`](Self::is_fatal)) end the current
/// socket and trigger a rebind after backoff. The rest are per-datagram and
/// the receive loop carries on.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to open or bind the receive socket
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Configured bind address is not an IP address
    #[error("invalid bind address '{address}'")]
    InvalidAddress { address: String },

    /// The socket itself failed while receiving
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    /// A single receive failed but the socket is still usable
    #[error("transient receive error: {0}")]
    RecvTransient(#[source] io::Error),

    /// Datagram longer than the configured limit (true size not known,
    /// the receive buffer holds one byte past the limit)
    #[error("packet exceeds limit {limit} bytes")]
    PacketTooLarge { limit: usize },

    /// A handler panicked while processing a notification
    #[error("handler panicked: {message}")]
    HandlerPanicked { message: String },
}

impl ListenerError {
    /// Whether this fault ends the current socket's lifetime
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::InvalidAddress { .. } | Self::Recv(_)
        )
    }
}

/// Why [`run`](crate::SyslogUdpListener::run) returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Cancellation was requested
    Cancelled,
    /// The consecutive failure cap was reached
    RetriesExhausted,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Consumer of listener notifications
pub trait ListenerHandler: Send + Sync {
    /// Called once per received datagram, in receive order
    fn on_message(&self, message: ReceivedMessage);

    /// Called once per caught fault
    fn on_error(&self, error: &ListenerError) {
        let _ = error;
    }
}

/// Ordered fan-out list of handlers
#[derive(Clone, Default)]
pub struct Handlers {
    handlers: Vec<Arc<dyn ListenerHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers are notified in registration order
    pub fn push(&mut self, handler: impl ListenerHandler + 'static) {
        self.handlers.push(Arc::new(handler));
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver a message to every handler
    ///
    /// The last handler receives the original value, the others a clone.
    /// Returns one error per handler that panicked.
    pub(crate) fn dispatch_message(&self, message: ReceivedMessage) -> Vec<ListenerError> {
        let mut panics = Vec::new();

        let Some((last, rest)) = self.handlers.split_last() else {
            return panics;
        };

        for handler in rest {
            let message = message.clone();
            if let Err(payload) =
                panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(message)))
            {
                panics.push(ListenerError::HandlerPanicked {
                    message: panic_message(payload.as_ref()),
                });
            }
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| last.on_message(message))) {
            panics.push(ListenerError::HandlerPanicked {
                message: panic_message(payload.as_ref()),
            });
        }

        panics
    }

    /// Deliver an error to every handler
    ///
    /// Panics here are logged only, never re-reported.
    pub(crate) fn dispatch_error(&self, error: &ListenerError) {
        for handler in &self.handlers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_error(error)))
            {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    "syslog UDP error handler panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}

/// Handler built from closures
pub struct FnHandler<M, E> {
    on_message: M,
    on_error: E,
}

impl<M, E> FnHandler<M, E>
where
    M: Fn(ReceivedMessage) + Send + Sync,
    E: Fn(&ListenerError) + Send + Sync,
{
    pub fn new(on_message: M, on_error: E) -> Self {
        Self {
            on_message,
            on_error,
        }
    }
}

impl<M> FnHandler<M, fn(&ListenerError)>
where
    M: Fn(ReceivedMessage) + Send + Sync,
{
    /// Handler that only cares about messages
    pub fn messages(on_message: M) -> Self {
        Self {
            on_message,
            on_error: ignore_error,
        }
    }
}

fn ignore_error(_: &ListenerError) {}

impl<M, E> ListenerHandler for FnHandler<M, E>
where
    M: Fn(ReceivedMessage) + Send + Sync,
    E: Fn(&ListenerError) + Send + Sync,
{
    fn on_message(&self, message: ReceivedMessage) {
        (self.on_message)(message)
    }

    fn on_error(&self, error: &ListenerError) {
        (self.on_error)(error)
    }
}

/// Notification as carried over a channel
///
/// `io::Error` is not `Clone`, so errors travel as their rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Message(ReceivedMessage),
    Error { message: String, fatal: bool },
}

/// Handler that pushes notifications into an unbounded channel
///
/// Sends never block the receive loop. Events are dropped once the
/// receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ChannelHandler {
    /// Create a handler and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ListenerHandler for ChannelHandler {
    fn on_message(&self, message: ReceivedMessage) {
        let _ = self.tx.send(ListenerEvent::Message(message));
    }

    fn on_error(&self, error: &ListenerError) {
        let _ = self.tx.send(ListenerEvent::Error {
            message: error.to_string(),
            fatal: error.is_fatal(),
        });
    }
}
