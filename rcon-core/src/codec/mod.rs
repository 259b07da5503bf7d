//! Length-prefixed framing for both wire variants.
//!
//! [`try_decode`] is the pure, stateless core: it never consumes a
//! partial packet. [`RconCodec`] wraps it for `tokio_util::codec::Framed`.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::RconError;
use crate::opcode::WireVariant;
use crate::packet::{MAX_PACKET_SIZE, Packet, SIZE_FIELD_LEN};

/// Smallest legal size field per variant.
///
/// Source needs id + type + two terminators. The opcode variant only
/// strictly needs the opcode byte; some servers omit the terminator.
const fn min_size(variant: WireVariant) -> usize {
    match variant {
        WireVariant::Source => 10,
        WireVariant::Opcode => 1,
    }
}

/// Try to pull one complete packet off the front of `buf`.
///
/// Returns `Ok(None)` while fewer than `4 + size` bytes are buffered.
/// On success returns the packet and how many bytes to drop from the
/// front of the buffer. A size field that cannot belong to `variant`
/// is a `MalformedPacket` error: the caller cannot know where the next
/// packet starts, so the stream must be abandoned.
pub fn try_decode(
    buf: &[u8],
    variant: WireVariant,
    max_size: usize,
) -> Result<Option<(Packet, usize)>, RconError> {
    if buf.len() < SIZE_FIELD_LEN {
        return Ok(None);
    }

    let mut head = &buf[..SIZE_FIELD_LEN];
    let size = head.get_i32_le();
    if size < min_size(variant) as i32 || size as usize > max_size {
        return Err(RconError::MalformedPacket(format!(
            "size field {size} out of range for {variant} variant (min {}, max {max_size})",
            min_size(variant)
        )));
    }

    let total = SIZE_FIELD_LEN + size as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let mut frame = &buf[SIZE_FIELD_LEN..total];
    let (id, kind) = match variant {
        WireVariant::Source => (frame.get_i32_le(), frame.get_i32_le()),
        WireVariant::Opcode => (0, frame.get_u8() as i32),
    };

    let body = strip_trailing_nuls(frame);
    let packet = Packet::from_wire(variant, id, kind, Bytes::copy_from_slice(body));
    Ok(Some((packet, total)))
}

fn strip_trailing_nuls(mut body: &[u8]) -> &[u8] {
    while let [rest @ .., 0] = body {
        body = rest;
    }
    body
}

/// Encode one packet to a fresh buffer.
pub fn encode(packet: &Packet) -> Bytes {
    packet.to_bytes()
}

/// `tokio_util` codec for one wire variant.
#[derive(Debug, Clone)]
pub struct RconCodec {
    variant: WireVariant,
    max_packet_size: usize,
}

impl RconCodec {
    pub fn new(variant: WireVariant) -> Self {
        Self {
            variant,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, max: usize) -> Self {
        self.max_packet_size = max;
        self
    }

    pub fn variant(&self) -> WireVariant {
        self.variant
    }
}

impl tokio_util::codec::Decoder for RconCodec {
    type Item = Packet;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match try_decode(src, self.variant, self.max_packet_size)? {
            Some((packet, consumed)) => {
                src.advance(consumed);
                Ok(Some(packet))
            }
            None => {
                // Size is known once four bytes are in; grow the buffer once.
                if src.len() >= SIZE_FIELD_LEN {
                    let size = (&src[..SIZE_FIELD_LEN]).get_i32_le() as usize;
                    src.reserve(SIZE_FIELD_LEN + size - src.len());
                }
                Ok(None)
            }
        }
    }
}

impl tokio_util::codec::Encoder<Packet> for RconCodec {
    type Error = RconError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.variant() != self.variant {
            return Err(RconError::InvalidPacket("packet variant does not match codec"));
        }
        if item.size_field() > self.max_packet_size {
            return Err(RconError::InvalidPacket("packet exceeds maximum packet size"));
        }
        item.write_to(dst);
        Ok(())
    }
}
