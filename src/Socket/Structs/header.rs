// Wire header that precedes every framed message.

/// Endpoint id reserved as "unset"; the remote side overwrites it on receipt.
pub const NO_ENDPOINT: u8 = 255;

/// Encoded size of [`MessageHeader`] on the wire.
pub const HEADER_SIZE: usize = 8;

/// Framing header: total message size, endpoints and message type.
/// Little-endian on the wire: size u32, src u8, dst u8, message_type u16.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Header + args + payload, in bytes.
    pub size: u32,
    pub src_id: u8,
    pub dst_id: u8,
    pub message_type: u16,
}

impl MessageHeader {
    /// Header for an outgoing message; the source is left unset.
    pub fn outgoing(dst_id: u8, message_type: u16, body_len: u32) -> Self {
        Self {
            size: HEADER_SIZE as u32 + body_len,
            src_id: NO_ENDPOINT,
            dst_id,
            message_type,
        }
    }

    /// Bytes following the header. Zero for a malformed size below the header length.
    pub fn body_len(&self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }

    /// `size` covers at least the header itself.
    pub fn is_well_formed(&self) -> bool {
        self.size as usize >= HEADER_SIZE
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4] = self.src_id;
        out[5] = self.dst_id;
        out[6..8].copy_from_slice(&self.message_type.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            size: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            src_id: bytes[4],
            dst_id: bytes[5],
            message_type: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}
