use crate::error::FrameError;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    Cont = 0x0,
    Text = 0x1,
    Bin = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Close, ping and pong; these must be final and carry at most 125 bytes.
    #[must_use]
    pub fn is_control(self) -> bool { self as u8 & 0x8 != 0 }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        Ok(match b {
            0x0 => Self::Cont,
            0x1 => Self::Text,
            0x2 => Self::Bin,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => return Err(FrameError::UnknownOpcode(other)),
        })
    }
}
