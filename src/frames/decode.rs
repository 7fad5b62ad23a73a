use std::{marker::PhantomData, ops::Deref};

use bytes::BytesMut;

use super::{Frame, Opcode, frame::MAX_SHORT_LEN};
use crate::{error::FrameError, role::RolePolicy};

type Result<T> = std::result::Result<T, FrameError>;

#[derive(Debug)]
pub enum FrameState {
    Complete(Frame),
    Incomplete,
}

/// Incremental frame decoder.
///
/// Bytes are pushed in as they arrive and [`FrameDecoder::next_frame`] yields a frame once
/// all of it is buffered. Any error leaves the buffer in an undefined position, so the
/// caller must stop decoding and close the connection.
pub struct FrameDecoder<P: RolePolicy> {
    buf: BytesMut,
    state: DecodeState,
    ctx: DecodeContext,
    max_payload: usize,
    _p: PhantomData<P>,
}

#[derive(Debug)]
enum DecodeState {
    Header,
    ExtendedLen,
    Mask,
    Payload,
}

#[derive(Debug)]
struct DecodeContext {
    opcode: Opcode,
    len_field: u8,
    payload_len: usize,
    mask_key: Option<[u8; 4]>,
}

impl<P: RolePolicy> FrameDecoder<P> {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::Header,
            ctx: DecodeContext {
                opcode: Opcode::Cont,
                len_field: 0,
                payload_len: 0,
                mask_key: None,
            },
            max_payload,
            _p: PhantomData,
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

    /// Buffer the reader fills directly, avoiding a copy through `push_bytes`.
    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut { &mut self.buf }

    /// Bytes still needed before the current step can make progress.
    pub(crate) fn bytes_wanted(&self) -> usize {
        let need = match self.state {
            DecodeState::Header => 2,
            DecodeState::ExtendedLen if self.ctx.len_field == 126 => 2,
            DecodeState::ExtendedLen => 8,
            DecodeState::Mask => 4,
            DecodeState::Payload => self.ctx.payload_len,
        };
        need.saturating_sub(self.buf.len())
    }

    pub fn next_frame(&mut self) -> Result<FrameState> {
        loop {
            let next_state = match self.state {
                DecodeState::Header => {
                    let Some([b0, b1]) = self.pop_n() else {
                        return Ok(FrameState::Incomplete);
                    };
                    self.parse_header(b0, b1)?
                }
                DecodeState::ExtendedLen => match self.parse_extended_len()? {
                    Some(state) => state,
                    None => return Ok(FrameState::Incomplete),
                },
                DecodeState::Mask => {
                    let Some(key) = self.pop_n() else {
                        return Ok(FrameState::Incomplete);
                    };
                    self.ctx.mask_key = Some(key);
                    DecodeState::Payload
                }
                DecodeState::Payload => {
                    if self.buf.len() < self.ctx.payload_len {
                        return Ok(FrameState::Incomplete);
                    }
                    self.state = DecodeState::Header;
                    return Ok(FrameState::Complete(self.take_frame()));
                }
            };
            self.state = next_state;
        }
    }

    fn parse_header(&mut self, b0: u8, b1: u8) -> Result<DecodeState> {
        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        if b0 & 0b1000_0000 == 0 {
            tracing::debug!("non-final frame");
            return Err(FrameError::NonFinal);
        }
        let (rsv1, rsv2, rsv3) = (
            b0 & 0b0100_0000 != 0,
            b0 & 0b0010_0000 != 0,
            b0 & 0b0001_0000 != 0,
        );
        if rsv1 || rsv2 || rsv3 {
            tracing::debug!(rsv1, rsv2, rsv3, "reserved bits set");
            return Err(FrameError::ReservedBits { rsv1, rsv2, rsv3 });
        }

        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        let masked = b1 & 0b1000_0000 != 0;
        if masked != P::EXPECT_MASKED {
            tracing::debug!(masked, role = P::NAME, "mask bit violates role policy");
            return Err(if masked {
                FrameError::UnexpectedMask
            } else {
                FrameError::Unmasked
            });
        }

        let opcode = Opcode::try_from(b0 & 0b0000_1111)?;
        let len_field = b1 & 0b0111_1111;
        if opcode.is_control() && usize::from(len_field) > MAX_SHORT_LEN {
            return Err(FrameError::ControlTooLong(u64::from(len_field)));
        }

        self.ctx = DecodeContext {
            opcode,
            len_field,
            payload_len: usize::from(len_field),
            mask_key: None,
        };

        Ok(match len_field {
            126 | 127 => DecodeState::ExtendedLen,
            _ => self.after_len()?,
        })
    }

    fn parse_extended_len(&mut self) -> Result<Option<DecodeState>> {
        let len = if self.ctx.len_field == 126 {
            // 126 => 2 bytes extended (u16)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            u64::from(u16::from_be_bytes(len_bytes))
        } else {
            // 127 => 8 bytes extended (u64)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            u64::from_be_bytes(len_bytes)
        };

        self.ctx.payload_len = usize::try_from(len)
            .ok()
            .filter(|&n| n <= self.max_payload)
            .ok_or(FrameError::TooLarge {
                len,
                max: self.max_payload,
            })?;
        self.after_len().map(Some)
    }

    fn after_len(&self) -> Result<DecodeState> {
        if self.ctx.payload_len > self.max_payload {
            return Err(FrameError::TooLarge {
                len: self.ctx.payload_len as u64,
                max: self.max_payload,
            });
        }
        Ok(if P::EXPECT_MASKED {
            DecodeState::Mask
        } else {
            DecodeState::Payload
        })
    }

    fn take_frame(&mut self) -> Frame {
        let mut payload = self.buf.split_to(self.ctx.payload_len);
        if let Some(key) = self.ctx.mask_key {
            crate::protocol::mask(&mut payload, key);
        }

        tracing::trace!(
            opcode = ?self.ctx.opcode,
            payload_len = payload.len(),
            role = P::NAME,
            "frame decoded"
        );
        Frame {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: self.ctx.opcode,
            mask_key: self.ctx.mask_key,
            payload: payload.freeze(),
        }
    }

    fn pop_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        if N > self.buf.len() {
            return None;
        }
        self.buf.split_to(N).deref().try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use proptest::{collection::vec, prelude::*};

    use super::*;
    use crate::role::{Client, Server};

    const MAX: usize = 1 << 20;

    fn decode_one<P: RolePolicy>(bytes: &[u8]) -> Result<FrameState> {
        let mut decoder = FrameDecoder::<P>::new(MAX);
        decoder.push_bytes(bytes);
        decoder.next_frame()
    }

    fn complete(state: FrameState) -> Frame {
        match state {
            FrameState::Complete(frame) => frame,
            FrameState::Incomplete => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn decodes_rfc_masked_hello() {
        let bytes = [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let frame = complete(decode_one::<Server>(&bytes).unwrap());
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(&frame.payload[..], b"Hello");
        assert_eq!(frame.mask_key, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert!(frame.fin);
    }

    #[test]
    fn rejects_non_final() {
        let bytes = [0x01, 0x80, 0, 0, 0, 0];
        assert!(matches!(decode_one::<Server>(&bytes), Err(FrameError::NonFinal)));
    }

    #[test]
    fn rejects_each_reserved_bit() {
        for (bit, expected) in [
            (0x40, (true, false, false)),
            (0x20, (false, true, false)),
            (0x10, (false, false, true)),
        ] {
            let bytes = [0x81 | bit, 0x80, 0, 0, 0, 0];
            match decode_one::<Server>(&bytes) {
                Err(FrameError::ReservedBits { rsv1, rsv2, rsv3 }) => {
                    assert_eq!((rsv1, rsv2, rsv3), expected);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn server_rejects_unmasked() {
        let bytes = [0x81, 0x02, b'h', b'i'];
        assert!(matches!(decode_one::<Server>(&bytes), Err(FrameError::Unmasked)));
    }

    #[test]
    fn client_rejects_masked() {
        let bytes = [0x81, 0x80, 1, 2, 3, 4];
        assert!(matches!(decode_one::<Client>(&bytes), Err(FrameError::UnexpectedMask)));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let bytes = [0x83, 0x80, 0, 0, 0, 0];
        assert!(matches!(decode_one::<Server>(&bytes), Err(FrameError::UnknownOpcode(3))));
    }

    #[test]
    fn rejects_long_control_frame() {
        let bytes = [0x89, 0x80 | 126, 0x00, 0x7E];
        assert!(matches!(decode_one::<Server>(&bytes), Err(FrameError::ControlTooLong(126))));
    }

    #[test]
    fn rejects_oversized_payload_before_buffering_it() {
        let mut decoder = FrameDecoder::<Server>::new(1024);
        decoder.push_bytes(&[0x82, 0x80 | 127]);
        decoder.push_bytes(&(1u64 << 40).to_be_bytes());
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::TooLarge { len, max: 1024 }) if len == 1 << 40
        ));
    }

    #[test]
    fn waits_for_missing_bytes() {
        let bytes = Frame::text("hello world").masked([9, 8, 7, 6]).encode();
        let mut decoder = FrameDecoder::<Server>::new(MAX);
        for (i, b) in bytes.iter().enumerate() {
            assert!(matches!(decoder.next_frame(), Ok(FrameState::Incomplete)));
            assert!(decoder.bytes_wanted() > 0, "byte {i}");
            decoder.push_bytes(&[*b]);
        }
        let frame = complete(decoder.next_frame().unwrap());
        assert_eq!(&frame.payload[..], b"hello world");
        assert_eq!(decoder.bytes_wanted(), 2);
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut decoder = FrameDecoder::<Server>::new(MAX);
        decoder.push_bytes(&Frame::text("one").masked([1, 1, 1, 1]).encode());
        decoder.push_bytes(&Frame::ping("two").masked([2, 2, 2, 2]).encode());

        let first = complete(decoder.next_frame().unwrap());
        let second = complete(decoder.next_frame().unwrap());
        assert_eq!(&first.payload[..], b"one");
        assert_eq!(second.opcode, Opcode::Ping);
        assert_eq!(&second.payload[..], b"two");
        assert!(matches!(decoder.next_frame(), Ok(FrameState::Incomplete)));
    }

    #[test]
    fn boundary_sizes_decode_through_their_marker() {
        for size in [0usize, 125, 126, 65535, 65536] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let bytes = Frame::binary(payload.clone()).masked([0xDE, 0xAD, 0xBE, 0xEF]).encode();
            let frame = complete(decode_one::<Server>(&bytes).unwrap());
            assert_eq!(frame.payload.len(), size);
            assert_eq!(&frame.payload[..], &payload[..]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn server_frames_decode_on_client(payload in vec(any::<u8>(), 0..70_000)) {
            let bytes = Frame::binary(payload.clone()).encode();
            let frame = complete(decode_one::<Client>(&bytes).unwrap());
            prop_assert_eq!(&frame.payload[..], &payload[..]);
            prop_assert!(!frame.is_masked());
        }

        #[test]
        fn client_masking_is_undone(payload in vec(any::<u8>(), 0..2048), key in any::<[u8; 4]>()) {
            let bytes = Frame::text(String::from_utf8_lossy(&payload).into_owned()).masked(key).encode();
            let frame = complete(decode_one::<Server>(&bytes).unwrap());
            prop_assert_eq!(frame.payload, String::from_utf8_lossy(&payload).into_owned());
        }

        #[test]
        fn fuzz_decoder(buf in vec(any::<u8>(), 0..2048)) {
            let mut fd = FrameDecoder::<Server>::new(MAX);
            fd.push_bytes(&buf);
            while let Ok(FrameState::Complete(_)) = fd.next_frame() {}
        }
    }
}
