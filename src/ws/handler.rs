use bytes::Bytes;

use crate::{error::CloseReason, protocol::Message};

/// Application behavior plugged into every connection.
///
/// Returning `Some` from `on_text` / `on_binary` sends that reply on the same connection.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_text(&self, text: String) -> Option<Message>;

    async fn on_binary(&self, bytes: Bytes) -> Option<Message>;

    /// The connection finished; `reason` is the peer's close code if it sent one.
    async fn on_close(&self, reason: Option<CloseReason>) { let _ = reason; }
}

/// Replies to every message with `you sent: <message>` as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait::async_trait]
impl MessageHandler for EchoHandler {
    async fn on_text(&self, text: String) -> Option<Message> {
        tracing::info!(len = text.len(), "got text message");
        Some(Message::Text(format!("you sent: {text}")))
    }

    async fn on_binary(&self, bytes: Bytes) -> Option<Message> {
        tracing::info!(len = bytes.len(), "got binary message");
        Some(Message::Text(format!(
            "you sent: {}",
            String::from_utf8_lossy(&bytes)
        )))
    }
}
