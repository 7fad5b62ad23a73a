#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::missing_safety_doc
)]

mod client;
mod config;
mod error;
mod frames;
pub mod handshake;
pub mod http;
mod protocol;
mod role;
mod server;
mod ws;

pub use client::{UpgradeError, WebSocketClient};
pub use config::{DEFAULT_GREETING, DEFAULT_MAX_PAYLOAD, ServerConfig};
pub use error::{CloseReason, FrameError};
pub use frames::{Frame, FrameDecoder, FrameReader, FrameState, FrameWriter, Opcode};
pub use handshake::{Accepted, HandshakeError, Rejection, Upgraded, compute_accept_key};
pub use protocol::Message;
pub use role::{Client, RolePolicy, Server};
pub use server::{Served, ServerError, WebSocketServer, serve_connection};
pub use ws::{CloseOutcome, Connection, EchoHandler, MessageHandler};
