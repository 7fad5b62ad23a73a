mod connection;
mod handler;

pub use connection::{CloseOutcome, Connection};
pub use handler::{EchoHandler, MessageHandler};
