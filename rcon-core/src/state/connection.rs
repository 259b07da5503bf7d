//! Connection lifecycle state machine.
//!
//! `ConnectionPhase` models one RCON session from socket open to
//! teardown, with validated transitions that return `Result` instead
//! of panicking.

use std::time::Instant;

use crate::error::RconError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of an RCON connection.
///
/// ```text
///  Idle ──► Connecting ──► Authenticating ──► Ready
///               │                │              │
///               │                ▼              │
///               │             Failed            │
///               ▼                ▼              ▼
///               └────────────► Closed ◄─────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// Constructed, `connect()` not yet called.
    #[default]
    Idle,

    /// TCP connect in progress.
    Connecting,

    /// Socket is up; auth packet sent, waiting for the reply.
    Authenticating,

    /// Authenticated; commands may be sent.
    Ready {
        /// When the connection entered the `Ready` state.
        since: Instant,
    },

    /// The server rejected the credentials.
    Failed,

    /// Socket torn down. Terminal.
    Closed,
}

/// Authentication progress as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Failed,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Ready { .. } => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// How long the connection has been `Ready`.
    ///
    /// Returns `None` for any other phase.
    pub fn ready_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Ready { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        match self {
            Self::Idle | Self::Connecting => AuthState::Unauthenticated,
            Self::Authenticating => AuthState::Authenticating,
            Self::Ready { .. } => AuthState::Authenticated,
            Self::Failed => AuthState::Failed,
            // A session that was torn down is no longer authenticated.
            Self::Closed => AuthState::Unauthenticated,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`. A connection is single-use.
    pub fn begin_connect(&mut self) -> Result<(), RconError> {
        match self {
            Self::Idle => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(RconError::ProtocolViolation(
                "cannot connect: connection already used",
            )),
        }
    }

    /// Transition to `Authenticating`.
    ///
    /// Valid from: `Connecting`. Fails with `ConnectionClosed` if the
    /// connection was torn down while the socket was opening.
    pub fn begin_auth(&mut self) -> Result<(), RconError> {
        match self {
            Self::Connecting => {
                *self = Self::Authenticating;
                Ok(())
            }
            Self::Closed => Err(RconError::ConnectionClosed),
            _ => Err(RconError::ProtocolViolation(
                "cannot authenticate: not in Connecting state",
            )),
        }
    }

    /// Transition to `Ready`.
    ///
    /// Valid from: `Authenticating`.
    pub fn complete_auth(&mut self) -> Result<(), RconError> {
        match self {
            Self::Authenticating => {
                *self = Self::Ready {
                    since: Instant::now(),
                };
                Ok(())
            }
            Self::Closed => Err(RconError::ConnectionClosed),
            _ => Err(RconError::ProtocolViolation(
                "cannot complete auth: not in Authenticating state",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Authenticating`.
    pub fn fail_auth(&mut self) -> Result<(), RconError> {
        match self {
            Self::Authenticating => {
                *self = Self::Failed;
                Ok(())
            }
            _ => Err(RconError::ProtocolViolation(
                "cannot fail auth: not in Authenticating state",
            )),
        }
    }

    /// Transition to `Closed` from any state.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        *self = Self::Closed;
        true
    }
}

// ── Tests ────────────────────────────────────────────────────────
