use bytes::Bytes;

use crate::frames::Frame;

/// An application-level reply handed back to the connection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Valid UTF-8 message.
    Text(String),
    /// Binary message bytes.
    Binary(Bytes),
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(s) => Frame::text(s),
            Message::Binary(b) => Frame::binary(b),
        }
    }
}
