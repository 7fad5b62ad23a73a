use std::{fmt::Write as _, io};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub(crate) const NOT_FOUND_BODY: &str =
    "<h1>Not Found</h1><p>Could not find what you were looking for :(</p>";
pub(crate) const INTERNAL_ERROR_BODY: &str =
    "<h1>Internal Server Error</h1><p>An unknown error occurred</p>";

/// A complete HTTP/1.1 response: status, headers and an in-memory body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    reason: &'static str,
    headers: Vec<(&'static str, String)>,
    body: Bytes,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn ok(body: impl Into<Bytes>, content_type: &str) -> Self {
        Self::new(200, "OK")
            .header("Content-Type", content_type)
            .body(body)
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
            .header("Content-Type", "text/html; charset=utf-8")
            .body(NOT_FOUND_BODY)
    }

    #[must_use]
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
            .header("Content-Type", "text/html; charset=utf-8")
            .body(INTERNAL_ERROR_BODY)
    }

    #[must_use]
    pub fn bad_request(body: impl Into<Bytes>) -> Self {
        Self::new(400, "Bad Request")
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
    }

    /// The `101` reply that completes a websocket handshake.
    #[must_use]
    pub fn switching_protocols(accept: &str) -> Self {
        Self::new(101, "Switching Protocols")
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", accept)
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn status(&self) -> u16 { self.status }

    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn body_bytes(&self) -> &[u8] { &self.body }

    /// Serialized head and body.
    ///
    /// Everything but a `101` gets `Content-Length` and `Connection: close`, since the
    /// server answers one request per connection.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        if self.status != 101 {
            let _ = write!(
                head,
                "Content-Length: {}\r\nConnection: close\r\n",
                self.body.len()
            );
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_protocols_has_no_body_headers() {
        let bytes = Response::switching_protocols("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").to_bytes();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn plain_response_carries_length_and_close() {
        let text = String::from_utf8(Response::bad_request("nope").to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nnope"));
    }
}
