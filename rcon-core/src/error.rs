//! Error types for the RCON client engine.
//!
//! Every fallible operation returns `Result<T, RconError>`. Errors are
//! handed back to the direct caller of `connect`/`execute`; nothing in
//! the engine panics on bad input from the wire.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the RCON engine.
#[derive(Debug, Error)]
pub enum RconError {
    // ── Connect Errors ───────────────────────────────────────────
    /// The TCP connect did not complete before the deadline.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The remote host actively refused the TCP connection.
    #[error("connection refused by {0}")]
    ConnectRefused(String),

    /// Any other IO failure while establishing the socket.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Auth Errors ──────────────────────────────────────────────
    /// The server rejected the password (or hung up during auth).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No auth response arrived before the deadline.
    #[error("no authentication response after {0:?}")]
    AuthTimeout(Duration),

    // ── Command Errors ───────────────────────────────────────────
    /// `execute` was called on a connection that is not `Ready`.
    #[error("not connected")]
    NotConnected,

    /// No response arrived for a command before the deadline.
    #[error("command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// A command is already outstanding on a single-flight connection.
    #[error("a command is already in flight")]
    CommandAlreadyInFlight,

    /// The connection went away while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    // ── Packet Errors ────────────────────────────────────────────
    /// Received bytes that cannot be a valid packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A packet was refused before it reached the wire.
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} value: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// An operation was attempted in a phase that does not allow it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

impl RconError {
    /// Whether a reconnect supervisor should try again after this error.
    ///
    /// Bad credentials and locally refused packets fail the same way on
    /// every attempt, so they are not retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RconError::AuthenticationFailed(_)
                | RconError::InvalidPacket(_)
                | RconError::UnknownVariant { .. }
                | RconError::ProtocolViolation(_)
        )
    }
}

impl Clone for RconError {
    // io::Error is not Clone; pending requests that all fail with the
    // same cause each get their own copy.
    fn clone(&self) -> Self {
        match self {
            Self::ConnectTimeout(d) => Self::ConnectTimeout(*d),
            Self::ConnectRefused(a) => Self::ConnectRefused(a.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::AuthenticationFailed(s) => Self::AuthenticationFailed(s.clone()),
            Self::AuthTimeout(d) => Self::AuthTimeout(*d),
            Self::NotConnected => Self::NotConnected,
            Self::CommandTimeout { command, timeout } => Self::CommandTimeout {
                command: command.clone(),
                timeout: *timeout,
            },
            Self::CommandAlreadyInFlight => Self::CommandAlreadyInFlight,
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::MalformedPacket(s) => Self::MalformedPacket(s.clone()),
            Self::InvalidPacket(s) => Self::InvalidPacket(s),
            Self::UnknownVariant { type_name, value } => Self::UnknownVariant {
                type_name,
                value: *value,
            },
            Self::ProtocolViolation(s) => Self::ProtocolViolation(s),
        }
    }
}
