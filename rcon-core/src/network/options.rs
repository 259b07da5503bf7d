//! Per-connection tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::AuthMatcher;
use crate::opcode::WireVariant;
use crate::packet::MAX_PACKET_SIZE;

/// What `execute()` does when the opcode variant already has a command
/// in flight. The Source variant ignores this: ids allow concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InFlightPolicy {
    /// Wait for the outstanding command, then send (FIFO).
    #[default]
    Queue,
    /// Fail immediately with `CommandAlreadyInFlight`.
    Reject,
}

/// Options fixed for the lifetime of one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Framing, chosen once up front and never guessed per packet.
    pub variant: WireVariant,
    /// Deadline for the TCP handshake.
    pub connect_timeout: Duration,
    /// Deadline for the reply to the auth packet.
    pub auth_timeout: Duration,
    /// Default deadline for `execute()`.
    pub command_timeout: Duration,
    /// Recognises the opcode variant's textual auth acceptance.
    pub auth_matcher: AuthMatcher,
    pub in_flight: InFlightPolicy,
    /// Largest size field accepted from the server.
    pub max_packet_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            variant: WireVariant::default(),
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(15),
            auth_matcher: AuthMatcher::default(),
            in_flight: InFlightPolicy::default(),
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl ConnectOptions {
    pub fn new(variant: WireVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_auth_matcher(mut self, matcher: AuthMatcher) -> Self {
        self.auth_matcher = matcher;
        self
    }

    pub fn with_in_flight(mut self, policy: InFlightPolicy) -> Self {
        self.in_flight = policy;
        self
    }

    pub fn with_max_packet_size(mut self, max: usize) -> Self {
        self.max_packet_size = max;
        self
    }
}
