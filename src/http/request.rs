use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

const MAX_LINE: u64 = 8 * 1024;
const MAX_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The peer closed the connection before sending a request line.
    #[error("connection closed before a request was received")]
    ConnectionClosed,
    #[error("request line or header exceeds {MAX_LINE} bytes")]
    LineTooLong,
    #[error("more than {MAX_HEADERS} headers")]
    TooManyHeaders,
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),
    #[error("request head is not valid UTF-8")]
    NotUtf8,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Request line and headers of an HTTP/1.x request. Bodies are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    /// `(major, minor)`
    pub version: (u8, u8),
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Reads up to and including the blank line that ends the head.
    ///
    /// Reads exactly the head and nothing more from `reader`, so bytes the client sent
    /// afterwards stay buffered for whoever takes over the stream.
    pub async fn read<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Self, HttpError> {
        let mut line = String::new();
        if read_line(reader, &mut line).await? == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        let (method, target, version) = parse_request_line(line.trim_end())?;

        let mut headers = Vec::new();
        loop {
            line.clear();
            if read_line(reader, &mut line).await? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if headers.len() == MAX_HEADERS {
                return Err(HttpError::TooManyHeaders);
            }
            let (name, value) = line
                .split_once(':')
                .filter(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
                .ok_or_else(|| HttpError::MalformedHeader(line.to_string()))?;
            headers.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method,
            target,
            version,
            headers,
        })
    }

    /// First value of the header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request target without its query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut String,
) -> Result<usize, HttpError> {
    let n = match (&mut *reader).take(MAX_LINE).read_line(line).await {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(HttpError::NotUtf8),
        Err(e) => return Err(e.into()),
    };
    if n as u64 == MAX_LINE && !line.ends_with('\n') {
        return Err(HttpError::LineTooLong);
    }
    Ok(n)
}

fn parse_request_line(line: &str) -> Result<(String, String, (u8, u8)), HttpError> {
    let malformed = || HttpError::MalformedRequestLine(line.to_string());

    let mut parts = line.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let version = version.strip_prefix("HTTP/").ok_or_else(malformed)?;
    let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
    let version = (
        major.parse().map_err(|_| malformed())?,
        minor.parse().map_err(|_| malformed())?,
    );

    Ok((method.to_string(), target.to_string(), version))
}
