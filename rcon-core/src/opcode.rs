//! Wire variants, Source-style packet types and single-byte opcodes.
//!
//! Unknown values come back as `UnknownVariant` errors through `TryFrom`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RconError;

// ── WireVariant ──────────────────────────────────────────────────

/// Which framing a connection speaks. Chosen once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireVariant {
    /// `[i32 size][i32 id][i32 type][body][0x00][0x00]`
    Source,
    /// `[i32 size][u8 opcode][body][0x00]`, no id on the wire.
    #[default]
    Opcode,
}

impl WireVariant {
    /// Bytes between the size field and the body.
    pub const fn header_len(self) -> usize {
        match self {
            WireVariant::Source => 8,
            WireVariant::Opcode => 1,
        }
    }

    /// Number of NUL bytes written after the body.
    pub const fn trailer_len(self) -> usize {
        match self {
            WireVariant::Source => 2,
            WireVariant::Opcode => 1,
        }
    }

    /// Whether responses carry an id usable for correlation.
    pub const fn has_ids(self) -> bool {
        matches!(self, WireVariant::Source)
    }
}

impl fmt::Display for WireVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireVariant::Source => write!(f, "source"),
            WireVariant::Opcode => write!(f, "opcode"),
        }
    }
}

impl std::str::FromStr for WireVariant {
    type Err = RconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(WireVariant::Source),
            "opcode" | "isle" => Ok(WireVariant::Opcode),
            _ => Err(RconError::ProtocolViolation("unknown wire variant")),
        }
    }
}

// ── PacketType ───────────────────────────────────────────────────

/// The `type` field of a Source-style packet.
///
/// The value `2` is overloaded: it is both the exec-command request
/// type and the auth-response type, so this is a transparent newtype
/// with named constants rather than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketType(pub i32);

impl PacketType {
    pub const AUTH: PacketType = PacketType(3);
    pub const AUTH_RESPONSE: PacketType = PacketType(2);
    pub const EXEC_COMMAND: PacketType = PacketType(2);
    pub const RESPONSE_VALUE: PacketType = PacketType(0);
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            3 => write!(f, "AUTH"),
            2 => write!(f, "EXEC_COMMAND/AUTH_RESPONSE"),
            0 => write!(f, "RESPONSE_VALUE"),
            other => write!(f, "type({other})"),
        }
    }
}

// ── Opcode ───────────────────────────────────────────────────────

/// Opcodes understood by the single-byte variant.
///
/// Organized by category:
/// - `0x01..0x03`: Session (auth, exec, response)
/// - `0x10..0x15`: Messaging and world state
/// - `0x20..0x77`: Player management
/// - `0x81..0x92`: Server toggles
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ── Session ──────────────────────────────────────────────────
    /// Password authentication.
    Auth = 0x01,
    /// Free-form console command.
    ExecCommand = 0x02,
    /// Server response value.
    ResponseValue = 0x03,

    // ── Messaging / World ────────────────────────────────────────
    /// Broadcast announcement.
    Announce = 0x10,
    /// Message a single player.
    DirectMessage = 0x11,
    /// Server details query.
    ServerDetails = 0x12,
    /// Remove all corpses.
    WipeCorpses = 0x13,
    /// Reload playable classes.
    UpdatePlayables = 0x15,

    // ── Players ──────────────────────────────────────────────────
    BanPlayer = 0x20,
    KickPlayer = 0x30,
    GetPlayerList = 0x40,
    Save = 0x50,
    GetPlayerData = 0x77,

    // ── Toggles ──────────────────────────────────────────────────
    ToggleWhitelist = 0x81,
    AddWhitelistId = 0x82,
    RemoveWhitelistId = 0x83,
    ToggleGlobalChat = 0x84,
    ToggleHumans = 0x86,
    ToggleAi = 0x90,
    DisableAiClasses = 0x91,
    AiDensity = 0x92,
}

impl TryFrom<u8> for Opcode {
    type Error = RconError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            0x01 => Auth,
            0x02 => ExecCommand,
            0x03 => ResponseValue,
            0x10 => Announce,
            0x11 => DirectMessage,
            0x12 => ServerDetails,
            0x13 => WipeCorpses,
            0x15 => UpdatePlayables,
            0x20 => BanPlayer,
            0x30 => KickPlayer,
            0x40 => GetPlayerList,
            0x50 => Save,
            0x77 => GetPlayerData,
            0x81 => ToggleWhitelist,
            0x82 => AddWhitelistId,
            0x83 => RemoveWhitelistId,
            0x84 => ToggleGlobalChat,
            0x86 => ToggleHumans,
            0x90 => ToggleAi,
            0x91 => DisableAiClasses,
            0x92 => AiDensity,
            _ => {
                return Err(RconError::UnknownVariant {
                    type_name: "Opcode",
                    value: value as u64,
                });
            }
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, *self as u8)
    }
}
