use std::{collections::HashMap, io};

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
        split,
    },
    net::{TcpStream, ToSocketAddrs},
};

use crate::{
    config::DEFAULT_MAX_PAYLOAD,
    error::{CloseReason, FrameError},
    frames::{Frame, FrameReader, FrameWriter},
    handshake::compute_accept_key,
    role::Client,
};

type Result<T> = std::result::Result<T, UpgradeError>;

/// Errors that can occur when upgrading a TCP stream to a WebSocket.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// Failed to establish TCP connection.
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    /// Reading or writing the handshake failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Server returned an unexpected HTTP status line.
    #[error("unexpected status line {0:?}")]
    StatusLine(String),
    /// A handshake header did not match expectations.
    #[error("header {field}: expected {expected:?}, got {got:?}")]
    Header {
        /// The name of the header field.
        field: &'static str,
        /// The expected value.
        expected: String,
        /// The actual value, if any.
        got: Option<String>,
    },
}

/// Client end of a websocket, used to talk to the server from tests and the CLI.
pub struct WebSocketClient<S = TcpStream> {
    reader: FrameReader<BufReader<ReadHalf<S>>, Client>,
    writer: FrameWriter<WriteHalf<S>, Client>,
}

impl WebSocketClient {
    /// Connects to `addr` and upgrades the connection on `path`.
    pub async fn connect(addr: impl ToSocketAddrs, path: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(UpgradeError::Connect)?;
        let host = stream.peer_addr()?.to_string();
        Self::handshake(stream, &host, path).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> WebSocketClient<S> {
    /// Runs the opening handshake over an already connected stream.
    pub async fn handshake(stream: S, host: &str, path: &str) -> Result<Self> {
        let key = {
            let mut key_bytes = [0u8; 16];
            rand::fill(&mut key_bytes);
            BASE64.encode(key_bytes)
        };

        let (reader, mut writer) = split(stream);
        let req = format!(
            "GET {path} HTTP/1.1\r\n\
            Host: {host}\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: {key}\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n",
        );
        writer.write_all(req.as_bytes()).await?;
        writer.flush().await?;

        let mut reader = BufReader::new(reader);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).await?;
        let mut status_parts = status_line.split_whitespace();
        if status_parts.next().is_none() || status_parts.next() != Some("101") {
            return Err(UpgradeError::StatusLine(status_line.trim_end().to_string()));
        }

        // header names lowercased
        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        validate_header(&headers, "Upgrade", "websocket", true)?;
        validate_header(&headers, "Connection", "upgrade", true)?;
        validate_header(
            &headers,
            "Sec-WebSocket-Accept",
            &compute_accept_key(&key),
            false,
        )?;

        tracing::info!(host, path, "successfully connected to peer");
        Ok(Self {
            reader: FrameReader::new(reader, DEFAULT_MAX_PAYLOAD),
            writer: FrameWriter::new(writer),
        })
    }

    /// Sends a frame, masked with a fresh key.
    pub async fn send(&mut self, frame: Frame) -> io::Result<()> { self.writer.send(frame).await }

    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send(Frame::text(text)).await
    }

    /// Writes raw bytes, for exercising the server with malformed frames.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.send_raw(bytes).await
    }

    pub async fn recv(&mut self) -> std::result::Result<Frame, FrameError> {
        self.reader.read_frame().await
    }

    /// Sends a normal close and waits for the server's close frame.
    pub async fn close(mut self) -> std::result::Result<Option<CloseReason>, FrameError> {
        self.send(Frame::close(Some(CloseReason::Normal), "")).await?;
        loop {
            let frame = self.recv().await?;
            if frame.opcode == crate::frames::Opcode::Close {
                let _ = self.writer.shutdown().await;
                return Ok(frame.close_reason());
            }
        }
    }
}

fn validate_header(
    headers: &HashMap<String, String>,
    field: &'static str,
    expected: &str,
    ignore_case: bool,
) -> Result<()> {
    let got = headers.get(&field.to_ascii_lowercase());
    let ok = got.is_some_and(|v| {
        if ignore_case {
            v.eq_ignore_ascii_case(expected)
        } else {
            v == expected
        }
    });
    if !ok {
        return Err(UpgradeError::Header {
            field,
            expected: expected.into(),
            got: got.cloned(),
        });
    }
    Ok(())
}
