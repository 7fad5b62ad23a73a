use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use percent_encoding::percent_decode_str;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};
use tracing::Instrument;

use crate::{
    config::ServerConfig,
    handshake::{self, HandshakeError},
    http::{ContentProvider, HttpError, RequestHead, Response, StaticDir, content_type},
    ws::{CloseOutcome, Connection, EchoHandler, MessageHandler},
};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What became of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// Answered with a plain HTTP response carrying this status.
    Http(u16),
    /// Upgraded and ran until the websocket closed.
    WebSocket(CloseOutcome),
    /// The peer hung up without sending a request.
    Idle,
}

pub struct WebSocketServer<H = EchoHandler, C = StaticDir> {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handler: Arc<H>,
    content: Arc<C>,
}

impl WebSocketServer {
    /// Binds the listener, serving `config.static_dir` and echoing websocket messages.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{}", config.addr, config.port),
                source,
            })?;
        tracing::info!(addr = %listener.local_addr()?, "Listening on");

        Ok(Self {
            listener,
            content: Arc::new(StaticDir::new(&config.static_dir)),
            config: Arc::new(config),
            handler: Arc::new(EchoHandler),
        })
    }
}

impl<H: MessageHandler, C: ContentProvider> WebSocketServer<H, C> {
    #[must_use]
    pub fn with_handler<H2: MessageHandler>(self, handler: H2) -> WebSocketServer<H2, C> {
        WebSocketServer {
            listener: self.listener,
            config: self.config,
            handler: Arc::new(handler),
            content: self.content,
        }
    }

    #[must_use]
    pub fn with_content<C2: ContentProvider>(self, content: C2) -> WebSocketServer<H, C2> {
        WebSocketServer {
            listener: self.listener,
            config: self.config,
            handler: self.handler,
            content: Arc::new(content),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.listener.local_addr() }

    /// Accepts connections forever, one task each.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // usually fd exhaustion; back off instead of spinning
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let handler = Arc::clone(&self.handler);
            let content = Arc::clone(&self.content);
            let span = tracing::info_span!("conn", %peer);
            tokio::spawn(
                async move {
                    tracing::debug!("client connected");
                    match serve_connection(stream, &config, handler, &*content).await {
                        Ok(served) => tracing::debug!(?served, "connection done"),
                        Err(e) => tracing::warn!(error = %e, "connection failed"),
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Handles one request on `stream`: a websocket upgrade on `config.ws_path`, a static
/// file under `/static/`, or the index page for anything else.
pub async fn serve_connection<S, H, C>(
    stream: S,
    config: &ServerConfig,
    handler: Arc<H>,
    content: &C,
) -> Result<Served, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: MessageHandler,
    C: ContentProvider + ?Sized,
{
    let (reader, mut writer) = tokio::io::split(stream);
    // kept through the upgrade so bytes buffered past the head reach the frame reader
    let mut reader = BufReader::new(reader);

    let head = match RequestHead::read(&mut reader).await {
        Ok(head) => head,
        Err(HttpError::ConnectionClosed) => return Ok(Served::Idle),
        Err(e @ HttpError::Io(_)) => return Err(e.into()),
        Err(e) => {
            tracing::debug!(error = %e, "bad request");
            respond(&mut writer, Response::bad_request(e.to_string())).await?;
            return Err(e.into());
        }
    };
    tracing::debug!(method = %head.method, target = %head.target, "request");

    let Ok(path) = percent_decode_str(head.path()).decode_utf8() else {
        let resp = Response::bad_request("request path is not valid UTF-8");
        return respond(&mut writer, resp).await;
    };
    if *path != *config.ws_path {
        let resp = static_response(&path, config, content).await;
        return respond(&mut writer, resp).await;
    }

    let accepted = match handshake::validate(&head) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            tracing::warn!(%rejection, "upgrade rejected");
            return respond(&mut writer, rejection.response()).await;
        }
    };

    let upgraded = handshake::upgrade(reader, writer, &accepted)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "takeover failed"))?;
    tracing::info!("upgraded to websocket");

    let outcome = Connection::new(upgraded, handler, config).run().await;
    Ok(Served::WebSocket(outcome))
}

async fn respond<W: AsyncWrite + Unpin>(
    writer: &mut W,
    resp: Response,
) -> Result<Served, ServerError> {
    resp.write_to(writer).await?;
    writer.shutdown().await?;
    Ok(Served::Http(resp.status()))
}

async fn static_response<C: ContentProvider + ?Sized>(
    path: &str,
    config: &ServerConfig,
    content: &C,
) -> Response {
    if let Some(file) = path.strip_prefix("/static/") {
        return match content.fetch(file).await {
            Ok(body) => Response::ok(body, content_type(file)),
            Err(e) => {
                tracing::debug!(file, error = %e, "static file unavailable");
                Response::not_found()
            }
        };
    }

    match content.fetch(&config.index).await {
        Ok(body) => Response::ok(body, content_type(&config.index)),
        Err(e) => {
            tracing::error!(index = %config.index, error = %e, "index unavailable");
            Response::internal_error()
        }
    }
}
