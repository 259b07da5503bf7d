//! "Is the RCON port accepting logins right now?"
//!
//! A probe opens a socket, sends one auth packet, reads one reply and
//! hangs up. It never produces a `Ready` connection; it only decides
//! whether a full reconnect is worth attempting.

use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::RconCodec;
use crate::error::RconError;
use crate::network::connection::{ConnectionInfo, exchange_auth, open_socket};
use crate::network::options::ConnectOptions;

/// What the server did with the probe's auth packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Credentials accepted.
    Accepted,
    /// The server answered, but not with an acceptance.
    Rejected(String),
    /// Socket opened, no reply before the auth timeout.
    NoResponse,
    /// Socket did not open.
    Unreachable(String),
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Accepted => write!(f, "accepted"),
            ProbeOutcome::Rejected(why) => write!(f, "rejected: {why}"),
            ProbeOutcome::NoResponse => write!(f, "no response"),
            ProbeOutcome::Unreachable(why) => write!(f, "unreachable: {why}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    /// Time from starting the connect to the verdict.
    pub latency: Duration,
}

impl ProbeReport {
    pub fn is_available(&self) -> bool {
        self.outcome == ProbeOutcome::Accepted
    }
}

/// Run one availability check against `info`.
pub async fn probe(info: &ConnectionInfo, options: &ConnectOptions) -> ProbeReport {
    let started = Instant::now();
    let outcome = match open_socket(info, options.connect_timeout).await {
        Err(e) => ProbeOutcome::Unreachable(e.to_string()),
        Ok(stream) => {
            let codec = RconCodec::new(options.variant).with_max_packet_size(options.max_packet_size);
            let mut framed = Framed::new(stream, codec);
            match exchange_auth(&mut framed, info.password(), options).await {
                Ok(()) => ProbeOutcome::Accepted,
                Err(RconError::AuthTimeout(_)) => ProbeOutcome::NoResponse,
                Err(RconError::AuthenticationFailed(why)) => ProbeOutcome::Rejected(why),
                Err(other) => ProbeOutcome::Rejected(other.to_string()),
            }
        }
    };
    let latency = started.elapsed();
    debug!(server = %info, %outcome, ?latency, "probe finished");
    ProbeReport { outcome, latency }
}
