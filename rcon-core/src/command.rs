//! Typed administrative commands.
//!
//! A [`Command`] is an opcode plus a text body. On the opcode variant
//! the opcode goes on the wire as-is. The Source variant only knows
//! free-form exec commands, so anything else is refused there.

use std::fmt;

use crate::error::RconError;
use crate::opcode::{Opcode, PacketType, WireVariant};
use crate::packet::Packet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: Opcode,
    body: String,
}

impl Command {
    /// Any opcode with any body.
    pub fn raw(opcode: Opcode, body: impl Into<String>) -> Self {
        Self {
            opcode,
            body: body.into(),
        }
    }

    /// Free-form console command.
    pub fn exec(text: impl Into<String>) -> Self {
        Self::raw(Opcode::ExecCommand, text)
    }

    pub fn announce(message: impl Into<String>) -> Self {
        Self::raw(Opcode::Announce, message)
    }

    pub fn direct_message(player: &str, message: &str) -> Self {
        Self::raw(Opcode::DirectMessage, format!("{player},{message}"))
    }

    /// Body is `"<player>",<reason>`.
    pub fn kick(player: &str, reason: &str) -> Self {
        Self::raw(Opcode::KickPlayer, format!("\"{player}\",{reason}"))
    }

    /// Same body shape as [`Command::kick`].
    pub fn ban(player: &str, reason: &str) -> Self {
        Self::raw(Opcode::BanPlayer, format!("\"{player}\",{reason}"))
    }

    pub fn player_list() -> Self {
        Self::raw(Opcode::GetPlayerList, "")
    }

    pub fn player_data(player: &str) -> Self {
        Self::raw(Opcode::GetPlayerData, player)
    }

    pub fn server_details() -> Self {
        Self::raw(Opcode::ServerDetails, "")
    }

    pub fn save() -> Self {
        Self::raw(Opcode::Save, "")
    }

    pub fn wipe_corpses() -> Self {
        Self::raw(Opcode::WipeCorpses, "")
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Frame this command for `variant`. `id` is only used by Source.
    pub fn to_packet(&self, variant: WireVariant, id: i32) -> Result<Packet, RconError> {
        match variant {
            WireVariant::Opcode => Packet::new_opcode(self.opcode, self.body.clone()),
            WireVariant::Source if self.opcode == Opcode::ExecCommand => {
                Packet::new_source(id, PacketType::EXEC_COMMAND, self.body.clone())
            }
            WireVariant::Source => Err(RconError::ProtocolViolation(
                "only exec commands can be sent on the Source variant",
            )),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Opcode::ExecCommand => write!(f, "{}", self.body),
            op if self.body.is_empty() => write!(f, "{op:?}"),
            op => write!(f, "{op:?} {}", self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kick_body_format() {
        let cmd = Command::kick("Rex42", "griefing");
        assert_eq!(cmd.opcode(), Opcode::KickPlayer);
        assert_eq!(cmd.body(), "\"Rex42\",griefing");
    }

    #[test]
    fn exec_on_source_uses_id() {
        let pkt = Command::exec("listplayers")
            .to_packet(WireVariant::Source, 12)
            .unwrap();
        assert_eq!(pkt.id(), Some(12));
        assert_eq!(pkt.packet_type(), Some(PacketType::EXEC_COMMAND));
        assert_eq!(pkt.body(), b"listplayers");
    }

    #[test]
    fn opcode_command_refused_on_source() {
        let err = Command::save().to_packet(WireVariant::Source, 2).unwrap_err();
        assert!(matches!(err, RconError::ProtocolViolation(_)));
    }

    #[test]
    fn opcode_variant_keeps_opcode() {
        let pkt = Command::player_list()
            .to_packet(WireVariant::Opcode, 99)
            .unwrap();
        assert_eq!(pkt.opcode().unwrap(), Opcode::GetPlayerList);
        assert_eq!(pkt.id(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Command::exec("help").to_string(), "help");
        assert_eq!(Command::save().to_string(), "Save");
        assert_eq!(Command::announce("hi").to_string(), "Announce hi");
    }
}
