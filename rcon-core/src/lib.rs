//! # rcon-core
//!
//! Client engine for length-prefixed RCON protocols.
//!
//! This crate contains:
//! - **Packets**: `Packet`, `Opcode`, `PacketType` for both wire variants
//! - **Codec**: `RconCodec` for framed TCP I/O via `tokio_util`
//! - **Auth**: `AuthMatcher` for textual auth acceptance
//! - **Commands**: `Command` with typed constructors for the opcode table
//! - **Network**: `Connection` (connect, authenticate, execute, disconnect) and `probe`
//! - **State**: connection phase machine and request `Correlator`
//! - **Reconnect**: `Backoff`, `Supervisor` and availability `Monitor`
//! - **Error**: `RconError`, a typed `thiserror` hierarchy

pub mod auth;
pub mod codec;
pub mod command;
pub mod error;
pub mod network;
pub mod opcode;
pub mod packet;
pub mod reconnect;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────

pub use auth::{AuthMatcher, DEFAULT_ACCEPT_PHRASE};
pub use codec::RconCodec;
pub use command::Command;
pub use error::RconError;
pub use network::{
    ConnectOptions, Connection, ConnectionInfo, InFlightPolicy, ProbeOutcome, ProbeReport,
    Target, probe,
};
pub use opcode::{Opcode, PacketType, WireVariant};
pub use packet::{MAX_PACKET_SIZE, Packet};
pub use reconnect::{AvailabilityEvent, Backoff, Connector, Monitor, Prober, Supervisor};
pub use state::{AuthState, ConnectionPhase};
