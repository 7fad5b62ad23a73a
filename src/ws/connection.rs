use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use super::MessageHandler;
use crate::{
    config::ServerConfig,
    error::{CloseReason, FrameError},
    frames::{Frame, FrameReader, FrameWriter, Opcode},
    handshake::Upgraded,
    role::Server,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Open,
    /// Our close frame is out; nothing else will be written.
    Closing,
    Closed,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The peer sent a close frame, carrying this code if it had one.
    PeerClosed(Option<CloseReason>),
    /// The peer broke the protocol; a close frame with this code was sent.
    Violation(CloseReason),
    /// The stream ended or failed without a close handshake.
    TransportClosed,
}

/// One upgraded connection. Owns both halves of the stream, so every write goes through
/// here and is never interleaved with another.
pub struct Connection<R, W, H> {
    reader: FrameReader<R, Server>,
    writer: FrameWriter<W, Server>,
    handler: Arc<H>,
    greeting: String,
    state: ConnState,
}

impl<R, W, H> Connection<R, W, H>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: MessageHandler,
{
    pub fn new(upgraded: Upgraded<R, W>, handler: Arc<H>, config: &ServerConfig) -> Self {
        Self {
            reader: FrameReader::new(upgraded.reader, config.max_payload),
            writer: FrameWriter::new(upgraded.writer),
            handler,
            greeting: config.greeting.clone(),
            state: ConnState::Open,
        }
    }

    /// Runs the connection to completion and releases the stream.
    pub async fn run(mut self) -> CloseOutcome {
        let outcome = self.drive().await;
        self.state = ConnState::Closed;
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "shutdown after close");
        }
        let reason = match outcome {
            CloseOutcome::PeerClosed(reason) => reason,
            CloseOutcome::Violation(reason) => Some(reason),
            CloseOutcome::TransportClosed => None,
        };
        self.handler.on_close(reason).await;
        tracing::info!(?outcome, "connection closed");
        outcome
    }

    async fn drive(&mut self) -> CloseOutcome {
        let greeting = Frame::text(self.greeting.clone());
        if let Err(e) = self.writer.send(greeting).await {
            tracing::warn!(error = %e, "failed to send greeting");
            return CloseOutcome::TransportClosed;
        }

        let mut outcome = CloseOutcome::TransportClosed;
        while self.state == ConnState::Open {
            let frame = match self.reader.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    outcome = self.on_decode_error(e).await;
                    continue;
                }
            };
            tracing::debug!(opcode = ?frame.opcode, len = frame.payload.len(), "frame received");

            let result = match frame.opcode {
                Opcode::Close => {
                    outcome = self.on_close(&frame).await;
                    Ok(())
                }
                Opcode::Ping => self.writer.send(Frame::pong(frame.payload)).await,
                Opcode::Pong => {
                    tracing::debug!("received pong");
                    Ok(())
                }
                Opcode::Text => match String::from_utf8(Vec::from(frame.payload)) {
                    Ok(text) => {
                        let reply = self.handler.on_text(text).await;
                        self.reply(reply.map(Frame::from)).await
                    }
                    Err(_) => {
                        outcome = self.fail(CloseReason::DataError, "invalid UTF-8").await;
                        Ok(())
                    }
                },
                Opcode::Bin => {
                    let reply = self.handler.on_binary(frame.payload).await;
                    self.reply(reply.map(Frame::from)).await
                }
                Opcode::Cont => {
                    outcome = self
                        .fail(CloseReason::ProtoError, "unexpected continuation frame")
                        .await;
                    Ok(())
                }
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "write failed");
                self.state = ConnState::Closed;
                outcome = CloseOutcome::TransportClosed;
            }
        }
        outcome
    }

    async fn reply(&mut self, frame: Option<Frame>) -> std::io::Result<()> {
        match frame {
            Some(frame) => self.writer.send(frame).await,
            None => Ok(()),
        }
    }

    async fn on_decode_error(&mut self, err: FrameError) -> CloseOutcome {
        match err.close_reason() {
            Some(reason) => {
                tracing::warn!(error = %err, "protocol violation");
                self.fail(reason, &err.to_string()).await
            }
            None => {
                tracing::info!(error = %err, "transport closed");
                self.state = ConnState::Closed;
                CloseOutcome::TransportClosed
            }
        }
    }

    /// Answers a close frame with the same code, or with 1002 if the frame is malformed.
    async fn on_close(&mut self, frame: &Frame) -> CloseOutcome {
        let reason = frame.close_reason();
        tracing::info!(?reason, "received close frame");

        if frame.payload.is_empty() {
            self.send_close(Frame::close(None, "")).await;
            self.state = ConnState::Closed;
            return CloseOutcome::PeerClosed(None);
        }
        let text_ok = frame
            .payload
            .get(2..)
            .is_some_and(|text| std::str::from_utf8(text).is_ok());
        match reason {
            Some(code) if code.is_sendable() && text_ok => {
                self.send_close(Frame::close(Some(code), "")).await;
                self.state = ConnState::Closed;
                CloseOutcome::PeerClosed(Some(code))
            }
            _ => self.fail(CloseReason::ProtoError, "invalid close frame").await,
        }
    }

    /// Starts the close sequence after a violation. Nothing more is read.
    async fn fail(&mut self, reason: CloseReason, text: &str) -> CloseOutcome {
        self.send_close(Frame::close(Some(reason), text)).await;
        self.state = ConnState::Closed;
        CloseOutcome::Violation(reason)
    }

    /// Sends at most one close frame per connection.
    async fn send_close(&mut self, frame: Frame) {
        if self.state != ConnState::Open {
            return;
        }
        self.state = ConnState::Closing;
        if let Err(e) = self.writer.send(frame).await {
            tracing::debug!(error = %e, "failed to send close frame");
        }
    }
}
