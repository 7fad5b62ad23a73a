use std::path::PathBuf;

pub const DEFAULT_GREETING: &str = "hey, this is a message from the server";
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Everything the server needs to know to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
    /// Directory served under `/static/` and for the index page.
    pub static_dir: PathBuf,
    /// File inside `static_dir` returned for every unmatched path.
    pub index: String,
    /// Path that accepts websocket upgrades.
    pub ws_path: String,
    /// Text frame sent as soon as a connection is upgraded.
    pub greeting: String,
    /// Largest frame payload accepted from a client.
    pub max_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".into(),
            port: 8080,
            static_dir: PathBuf::from("static"),
            index: "index.html".into(),
            ws_path: "/ws".into(),
            greeting: DEFAULT_GREETING.into(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_addr(&self) -> (&str, u16) { (self.addr.as_str(), self.port) }
}
