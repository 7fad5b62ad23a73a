use std::io;

/// Close reason codes as specified in
/// [RFC 6455](https://www.rfc-editor.org/rfc/rfc6455.html#section-7.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal close
    Normal,
    /// Going away
    GoingAway,
    /// Websocket protocol violation
    ProtoError,
    /// Unsupported data type
    DataType,
    /// No reason code provided
    NoneGiven,
    /// Abnormal closure
    Abnormal,
    /// Invalid UTF-8 in Text message
    DataError,
    /// Generic policy violation
    Policy,
    /// Messages are too big
    TooBig,
    /// An unexpected condition that prevented the request from being fulfilled
    Unexpected,
    /// Any other code, kept verbatim
    Other(u16),
}

impl CloseReason {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ProtoError => 1002,
            Self::DataType => 1003,
            Self::NoneGiven => 1005,
            Self::Abnormal => 1006,
            Self::DataError => 1007,
            Self::Policy => 1008,
            Self::TooBig => 1009,
            Self::Unexpected => 1011,
            Self::Other(code) => code,
        }
    }

    /// Whether this code may appear in a close frame on the wire.
    ///
    /// 1005, 1006 and 1015 only report local conditions, and everything outside the
    /// registered and private-use ranges is invalid.
    #[must_use]
    pub fn is_sendable(self) -> bool {
        matches!(self.code(), 1000..=1003 | 1007..=1011 | 3000..=4999)
    }

    /// Reads the status code at the start of a close frame payload, if there is one.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [hi, lo, ..] => Some(Self::from([*hi, *lo])),
            _ => None,
        }
    }
}

/// Converts a reason code to bytes of the appropriate endianness.
impl From<CloseReason> for [u8; 2] {
    fn from(value: CloseReason) -> Self { value.code().to_be_bytes() }
}

impl From<[u8; 2]> for CloseReason {
    fn from(bytes: [u8; 2]) -> Self {
        match u16::from_be_bytes(bytes) {
            1000 => CloseReason::Normal,
            1001 => CloseReason::GoingAway,
            1002 => CloseReason::ProtoError,
            1003 => CloseReason::DataType,
            1005 => CloseReason::NoneGiven,
            1006 => CloseReason::Abnormal,
            1007 => CloseReason::DataError,
            1008 => CloseReason::Policy,
            1009 => CloseReason::TooBig,
            1011 => CloseReason::Unexpected,
            code => CloseReason::Other(code),
        }
    }
}

/// Reasons a frame could not be decoded.
///
/// Everything except [`FrameError::Eof`] and [`FrameError::Io`] is a protocol violation by the
/// peer and ends the connection with a close frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// FIN bit clear; fragmented messages are not supported.
    #[error("frame is not final, fragmentation is unsupported")]
    NonFinal,
    /// An RSV bit is set but no extension was negotiated.
    #[error("reserved bits set (rsv1={rsv1}, rsv2={rsv2}, rsv3={rsv3})")]
    ReservedBits { rsv1: bool, rsv2: bool, rsv3: bool },
    /// A client sent a frame without a masking key.
    #[error("client frame is not masked")]
    Unmasked,
    /// A server sent a masked frame.
    #[error("server frame is masked")]
    UnexpectedMask,
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    /// Control frames carry at most 125 bytes.
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlTooLong(u64),
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: u64, max: usize },
    /// The stream ended, either between frames or in the middle of one.
    #[error("stream closed")]
    Eof,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Close code to send back for this error; `None` when the transport is already gone.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::Eof | Self::Io(_) => None,
            Self::TooLarge { .. } => Some(CloseReason::TooBig),
            _ => Some(CloseReason::ProtoError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_round_trips_known_and_unknown_codes() {
        for code in [1000u16, 1002, 1009, 3001, 4999] {
            let reason = CloseReason::from(code.to_be_bytes());
            assert_eq!(reason.code(), code);
        }
        assert_eq!(CloseReason::from([0x03, 0xEA]), CloseReason::ProtoError);
    }

    #[test]
    fn reserved_and_out_of_range_codes_are_not_sendable() {
        for code in [1000u16, 1001, 1003, 1007, 1010, 1011, 3000, 4999] {
            assert!(CloseReason::from(code.to_be_bytes()).is_sendable(), "{code}");
        }
        for code in [0u16, 999, 1004, 1005, 1006, 1012, 1015, 2999, 5000] {
            assert!(!CloseReason::from(code.to_be_bytes()).is_sendable(), "{code}");
        }
    }

    #[test]
    fn close_reason_from_short_payload_is_none() {
        assert_eq!(CloseReason::from_payload(&[]), None);
        assert_eq!(CloseReason::from_payload(&[0x03]), None);
        assert_eq!(
            CloseReason::from_payload(&[0x03, 0xE8, b'b', b'y', b'e']),
            Some(CloseReason::Normal)
        );
    }

    #[test]
    fn violations_map_to_close_codes() {
        assert_eq!(FrameError::NonFinal.close_reason(), Some(CloseReason::ProtoError));
        assert_eq!(
            FrameError::TooLarge { len: 10, max: 1 }.close_reason(),
            Some(CloseReason::TooBig)
        );
        assert!(FrameError::Eof.close_reason().is_none());
    }
}
