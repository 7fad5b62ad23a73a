//! Just enough HTTP/1.1 to route a request: read its head, answer with a small
//! response, or hand the stream to the websocket handshake.

mod content;
mod request;
mod response;

pub use content::{ContentProvider, StaticDir, content_type};
pub use request::{HttpError, RequestHead};
pub use response::Response;
