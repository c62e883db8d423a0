//! Stdout consumer
//!
//! Writes each received message as one line:
//! `<rfc3339 utc time> <remote addr> <message>`
//!
//! Listener errors go to the log at warn level.

use std::io::{self, Write};

use chrono::SecondsFormat;
use sysrelay_sources::{ListenerError, ListenerHandler, ReceivedMessage};

/// Handler printing received messages to stdout
#[derive(Debug, Default)]
pub struct StdoutHandler;

impl StdoutHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ListenerHandler for StdoutHandler {
    fn on_message(&self, message: ReceivedMessage) {
        let line = format_line(&message);
        let mut out = io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::debug!(error = %e, "failed to write message to stdout");
        }
    }

    fn on_error(&self, error: &ListenerError) {
        tracing::warn!(error = %error, fatal = error.is_fatal(), "syslog listener error");
    }
}

/// Render a message as a single output line
///
/// Trailing line terminators are dropped; the message is otherwise verbatim.
pub fn format_line(message: &ReceivedMessage) -> String {
    format!(
        "{} {} {}",
        message
            .received_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        message.remote,
        message.message.trim_end_matches(['\r', '\n'])
    )
}
