use bytes::{BufMut, Bytes, BytesMut};

use super::Opcode;
use crate::error::CloseReason;

/// Largest payload that fits in the 7-bit length field.
pub(crate) const MAX_SHORT_LEN: usize = 125;

/// A single protocol frame.
///
/// Decoded frames hold their payload already unmasked; `mask_key` records the key they
/// arrived with. When encoding, a frame is masked iff `mask_key` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: Opcode,
    pub mask_key: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    /// A final, unmasked frame with no reserved bits set.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask_key: None,
            payload: payload.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self { Self::new(Opcode::Text, text.into()) }

    pub fn binary(bytes: impl Into<Bytes>) -> Self { Self::new(Opcode::Bin, bytes) }

    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping, payload) }

    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong, payload) }

    /// Close frame with an optional status code and reason text.
    ///
    /// The reason is cut at a char boundary so the payload stays within 125 bytes.
    pub fn close(reason: Option<CloseReason>, text: &str) -> Self {
        let Some(reason) = reason else {
            return Self::new(Opcode::Close, Bytes::new());
        };
        let mut end = text.len().min(MAX_SHORT_LEN - 2);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut buf = BytesMut::with_capacity(2 + end);
        buf.put_slice(&<[u8; 2]>::from(reason));
        buf.put_slice(&text.as_bytes()[..end]);
        Self::new(Opcode::Close, buf.freeze())
    }

    /// Sets the masking key used when this frame is encoded.
    #[must_use]
    pub fn masked(mut self, mask_key: [u8; 4]) -> Self {
        self.mask_key = Some(mask_key);
        self
    }

    #[must_use]
    pub fn is_masked(&self) -> bool { self.mask_key.is_some() }

    /// Status code carried by a close frame.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        if self.opcode == Opcode::Close {
            CloseReason::from_payload(&self.payload)
        } else {
            None
        }
    }

    /// Serializes the frame to wire format.
    ///
    /// Lengths up to 125 go in the 7-bit field, up to 65535 behind marker 126 with a 16-bit
    /// extension, anything larger behind marker 127 with a 64-bit extension. All big-endian.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let len = self.payload.len();
        let mut buf = BytesMut::with_capacity(len + 14);

        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        let mut b0 = self.opcode as u8;
        for (set, bit) in [
            (self.fin, 0x80),
            (self.rsv1, 0x40),
            (self.rsv2, 0x20),
            (self.rsv3, 0x10),
        ] {
            if set {
                b0 |= bit;
            }
        }
        buf.put_u8(b0);

        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        let mask_bit = if self.mask_key.is_some() { 0x80 } else { 0 };
        #[allow(clippy::cast_possible_truncation)]
        match len {
            0..=MAX_SHORT_LEN => buf.put_u8(mask_bit | len as u8),
            126..=0xFFFF => {
                buf.put_u8(mask_bit | 126);
                buf.put_u16(len as u16);
            }
            _ => {
                buf.put_u8(mask_bit | 127);
                buf.put_u64(len as u64);
            }
        }

        if let Some(mask_key) = self.mask_key {
            buf.put_slice(&mask_key);
            let start = buf.len();
            buf.put_slice(&self.payload);
            crate::protocol::mask(&mut buf[start..], mask_key);
        } else {
            buf.put_slice(&self.payload);
        }

        tracing::trace!(
            opcode = ?self.opcode,
            len,
            masked = self.is_masked(),
            "frame encoded"
        );
        buf.freeze()
    }
}
