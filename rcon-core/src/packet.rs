//! The `Packet` type shared by both wire variants.

use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RconError;
use crate::opcode::{Opcode, PacketType, WireVariant};

/// Width of the little-endian size prefix.
pub const SIZE_FIELD_LEN: usize = 4;

/// Largest value of the size field accepted by default (64 KiB).
pub const MAX_PACKET_SIZE: usize = 64 * 1024;

/// Id used for the auth request on the Source variant.
pub const AUTH_REQUEST_ID: i32 = 1;

/// Id a Source server puts in its auth response to signal a bad password.
pub const AUTH_FAILURE_ID: i32 = -1;

/// One unit of wire exchange.
///
/// `kind` holds the Source `type` field or the single opcode byte,
/// depending on `variant`. The opcode variant carries no id; `id` is
/// always `0` there and [`Packet::id`] returns `None`.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    variant: WireVariant,
    id: i32,
    kind: i32,
    body: Bytes,
}

impl Packet {
    pub fn new_source(id: i32, kind: PacketType, body: impl Into<Bytes>) -> Result<Self, RconError> {
        let body = body.into();
        Self::check_body(WireVariant::Source, &body)?;
        Ok(Self {
            variant: WireVariant::Source,
            id,
            kind: kind.0,
            body,
        })
    }

    pub fn new_opcode(opcode: Opcode, body: impl Into<Bytes>) -> Result<Self, RconError> {
        let body = body.into();
        Self::check_body(WireVariant::Opcode, &body)?;
        Ok(Self {
            variant: WireVariant::Opcode,
            id: 0,
            kind: opcode as u8 as i32,
            body,
        })
    }

    /// The password packet that opens a session.
    pub fn auth(variant: WireVariant, password: &str) -> Result<Self, RconError> {
        match variant {
            WireVariant::Source => Self::new_source(AUTH_REQUEST_ID, PacketType::AUTH, password.to_owned()),
            WireVariant::Opcode => Self::new_opcode(Opcode::Auth, password.to_owned()),
        }
    }

    /// Build a packet from already-decoded wire fields. No body checks:
    /// whatever the server sent is kept.
    pub(crate) fn from_wire(variant: WireVariant, id: i32, kind: i32, body: Bytes) -> Self {
        Self {
            variant,
            id,
            kind,
            body,
        }
    }

    fn check_body(variant: WireVariant, body: &[u8]) -> Result<(), RconError> {
        if body.contains(&0) {
            return Err(RconError::InvalidPacket("body contains a NUL byte"));
        }
        if body.len() + variant.header_len() + variant.trailer_len() > MAX_PACKET_SIZE {
            return Err(RconError::InvalidPacket("body exceeds maximum packet size"));
        }
        Ok(())
    }

    pub fn variant(&self) -> WireVariant {
        self.variant
    }

    /// Sequence id, present only on the Source variant.
    pub fn id(&self) -> Option<i32> {
        self.variant.has_ids().then_some(self.id)
    }

    /// Raw `type` field or opcode byte.
    pub fn kind(&self) -> i32 {
        self.kind
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        match self.variant {
            WireVariant::Source => Some(PacketType(self.kind)),
            WireVariant::Opcode => None,
        }
    }

    pub fn opcode(&self) -> Result<Opcode, RconError> {
        match self.variant {
            WireVariant::Opcode => Opcode::try_from(self.kind as u8),
            WireVariant::Source => Err(RconError::ProtocolViolation(
                "Source packets carry a type, not an opcode",
            )),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// A Source response with id `-1` means the password was rejected.
    pub fn is_auth_failure(&self) -> bool {
        self.variant == WireVariant::Source && self.id == AUTH_FAILURE_ID
    }

    /// Value written into the size field: everything after it.
    pub fn size_field(&self) -> usize {
        self.variant.header_len() + self.body.len() + self.variant.trailer_len()
    }

    /// Total length on the wire including the size prefix.
    pub fn encoded_len(&self) -> usize {
        SIZE_FIELD_LEN + self.size_field()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_i32_le(self.size_field() as i32);
        match self.variant {
            WireVariant::Source => {
                dst.put_i32_le(self.id);
                dst.put_i32_le(self.kind);
            }
            WireVariant::Opcode => dst.put_u8(self.kind as u8),
        }
        dst.extend_from_slice(&self.body);
        dst.put_bytes(0, self.variant.trailer_len());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Packet");
        s.field("variant", &self.variant);
        if let Some(id) = self.id() {
            s.field("id", &id);
        }
        s.field("kind", &self.kind)
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish()
    }
}
