//! Server side of the websocket opening handshake (RFC 6455 section 4.2).
//!
//! ```http
//! GET /ws HTTP/1.1
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! is answered with
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use std::io;

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::http::{RequestHead, Response};

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const WS_VERSION: &str = "13";

/// `Sec-WebSocket-Accept` for a given `Sec-WebSocket-Key`.
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(WS_GUID.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Why an upgrade request was turned down. Each variant maps to one HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("This service requires use of the HTTP/1.1 protocol.")]
    HttpVersion,
    #[error("The request method must be GET.")]
    Method,
    #[error("The request lacks the Connection header with an Upgrade value")]
    ConnectionHeader,
    #[error("The request lacks the Upgrade header with a websocket value")]
    UpgradeHeader,
    #[error("The request lacks the Sec-WebSocket-Key header")]
    MissingKey,
    #[error("The request does not have a valid value for the Sec-WebSocket-Key header")]
    InvalidKey,
    #[error("The request is for an unsupported WebSocket version")]
    WsVersion,
}

impl Rejection {
    #[must_use]
    pub fn status(self) -> (u16, &'static str) {
        match self {
            Self::HttpVersion | Self::WsVersion => (426, "Upgrade Required"),
            Self::Method => (405, "Method Not Allowed"),
            Self::ConnectionHeader | Self::UpgradeHeader | Self::MissingKey | Self::InvalidKey => {
                (400, "Bad Request")
            }
        }
    }

    /// Header telling the client what would have been accepted.
    #[must_use]
    pub fn advertised(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::HttpVersion => Some(("Upgrade", "HTTP/1.1")),
            Self::Method => Some(("Allow", "GET")),
            Self::WsVersion => Some(("Sec-WebSocket-Version", WS_VERSION)),
            _ => None,
        }
    }

    #[must_use]
    pub fn response(self) -> Response {
        let (status, reason) = self.status();
        let mut resp = Response::new(status, reason);
        if let Some((name, value)) = self.advertised() {
            resp = resp.header(name, value);
        }
        resp.header("Content-Type", "text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Writing the `101` failed, so the stream could not be handed to the frame loop.
    #[error("failed to take over the connection: {0}")]
    Takeover(#[source] io::Error),
}

/// A request that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    /// `Sec-WebSocket-Accept` value derived from the client's key.
    pub accept: String,
}

impl Accepted {
    #[must_use]
    pub fn response(&self) -> Response { Response::switching_protocols(&self.accept) }
}

/// Applies the upgrade checks in order, stopping at the first failure.
pub fn validate(req: &RequestHead) -> Result<Accepted, Rejection> {
    if req.version < (1, 1) {
        return Err(Rejection::HttpVersion);
    }

    if req.method != "GET" {
        return Err(Rejection::Method);
    }

    let connection = req.header("Connection").unwrap_or_default();
    if !connection.to_ascii_lowercase().contains("upgrade") {
        return Err(Rejection::ConnectionHeader);
    }

    if !req
        .header("Upgrade")
        .is_some_and(|u| u.eq_ignore_ascii_case("websocket"))
    {
        return Err(Rejection::UpgradeHeader);
    }

    let key = match req.header("Sec-WebSocket-Key") {
        Some(key) if !key.is_empty() => key,
        _ => return Err(Rejection::MissingKey),
    };

    if !BASE64.decode(key).is_ok_and(|k| k.len() == 16) {
        return Err(Rejection::InvalidKey);
    }

    if req.header("Sec-WebSocket-Version") != Some(WS_VERSION) {
        return Err(Rejection::WsVersion);
    }

    Ok(Accepted {
        accept: compute_accept_key(key),
    })
}

/// Both halves of a stream whose handshake has completed. Only frames flow from here on.
#[derive(Debug)]
pub struct Upgraded<R, W> {
    pub reader: R,
    pub writer: W,
}

/// Sends the `101` and takes ownership of the stream.
///
/// `reader` should be the same buffered reader the request head was read from, so any
/// frame bytes that arrived together with the head are not lost.
pub async fn upgrade<R, W>(
    reader: R,
    mut writer: W,
    accepted: &Accepted,
) -> Result<Upgraded<R, W>, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    accepted
        .response()
        .write_to(&mut writer)
        .await
        .map_err(HandshakeError::Takeover)?;
    tracing::debug!("switched protocols");
    Ok(Upgraded { reader, writer })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(edit: impl FnOnce(&mut RequestHead)) -> RequestHead {
        let mut head = RequestHead {
            method: "GET".into(),
            target: "/ws".into(),
            version: (1, 1),
            headers: vec![
                ("Host".into(), "localhost".into()),
                ("Connection".into(), "Upgrade".into()),
                ("Upgrade".into(), "websocket".into()),
                ("Sec-WebSocket-Key".into(), "dGhlIHNhbXBsZSBub25jZQ==".into()),
                ("Sec-WebSocket-Version".into(), "13".into()),
            ],
        };
        edit(&mut head);
        head
    }

    fn set(head: &mut RequestHead, name: &str, value: &str) {
        head.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        head.headers.push((name.into(), value.into()));
    }

    fn remove(head: &mut RequestHead, name: &str) {
        head.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    #[test]
    fn accept_key_matches_rfc_vector() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn accepts_valid_request() {
        let accepted = validate(&request(|_| {})).unwrap();
        assert_eq!(accepted.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn header_matching_is_case_insensitive() {
        let head = request(|h| {
            set(h, "connection", "keep-alive, UPGRADE");
            set(h, "upgrade", "WebSocket");
        });
        assert!(validate(&head).is_ok());
    }

    #[test]
    fn each_check_has_its_own_rejection() {
        let cases: Vec<(RequestHead, Rejection)> = vec![
            (request(|h| h.version = (1, 0)), Rejection::HttpVersion),
            (request(|h| h.method = "POST".into()), Rejection::Method),
            (request(|h| remove(h, "Connection")), Rejection::ConnectionHeader),
            (request(|h| set(h, "Connection", "keep-alive")), Rejection::ConnectionHeader),
            (request(|h| remove(h, "Upgrade")), Rejection::UpgradeHeader),
            (request(|h| set(h, "Upgrade", "websockets")), Rejection::UpgradeHeader),
            (request(|h| remove(h, "Sec-WebSocket-Key")), Rejection::MissingKey),
            (request(|h| set(h, "Sec-WebSocket-Key", "")), Rejection::MissingKey),
            (request(|h| set(h, "Sec-WebSocket-Key", "not base64!")), Rejection::InvalidKey),
            // 15 bytes
            (request(|h| set(h, "Sec-WebSocket-Key", "AAAAAAAAAAAAAAAAAAAA")), Rejection::InvalidKey),
            (request(|h| remove(h, "Sec-WebSocket-Version")), Rejection::WsVersion),
            (request(|h| set(h, "Sec-WebSocket-Version", "8")), Rejection::WsVersion),
        ];
        for (head, expected) in cases {
            assert_eq!(validate(&head), Err(expected), "{head:?}");
        }
    }

    #[test]
    fn checks_run_in_order() {
        // wrong version and wrong method: version wins
        let head = request(|h| {
            h.version = (1, 0);
            h.method = "POST".into();
        });
        assert_eq!(validate(&head), Err(Rejection::HttpVersion));

        // bad key and bad ws version: key wins
        let head = request(|h| {
            set(h, "Sec-WebSocket-Key", "short");
            set(h, "Sec-WebSocket-Version", "7");
        });
        assert_eq!(validate(&head), Err(Rejection::InvalidKey));
    }

    #[test]
    fn rejection_responses() {
        let resp = Rejection::HttpVersion.response();
        assert_eq!(resp.status(), 426);
        assert_eq!(resp.header_value("Upgrade"), Some("HTTP/1.1"));

        let resp = Rejection::Method.response();
        assert_eq!(resp.status(), 405);
        assert_eq!(resp.header_value("Allow"), Some("GET"));

        let resp = Rejection::WsVersion.response();
        assert_eq!(resp.status(), 426);
        assert_eq!(resp.header_value("Sec-WebSocket-Version"), Some("13"));

        let resp = Rejection::InvalidKey.response();
        assert_eq!(resp.status(), 400);
        assert!(!resp.body_bytes().is_empty());
    }

    #[tokio::test]
    async fn upgrade_writes_switching_protocols() {
        let accepted = validate(&request(|_| {})).unwrap();
        let upgraded = upgrade(&b""[..], Vec::new(), &accepted).await.unwrap();
        let text = String::from_utf8(upgraded.writer).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[tokio::test]
    async fn failed_takeover_is_reported() {
        #[derive(Debug)]
        struct Broken;
        impl AsyncWrite for Broken {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &[u8],
            ) -> std::task::Poll<io::Result<usize>> {
                std::task::Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
            }

            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let accepted = validate(&request(|_| {})).unwrap();
        let err = upgrade(&b""[..], Broken, &accepted).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Takeover(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
