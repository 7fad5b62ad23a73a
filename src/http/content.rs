use std::{
    io,
    path::{Component, Path, PathBuf},
};

use bytes::Bytes;

/// Supplies the bytes behind non-websocket routes.
#[async_trait::async_trait]
pub trait ContentProvider: Send + Sync + 'static {
    /// Fetches the file at `path`, relative to the provider's root.
    async fn fetch(&self, path: &str) -> io::Result<Bytes>;
}

/// Serves files from a directory on disk.
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    /// Joins `path` onto the root, refusing anything that could step outside it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel.as_os_str().is_empty()
            || !rel.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(rel))
    }
}

#[async_trait::async_trait]
impl ContentProvider for StaticDir {
    async fn fetch(&self, path: &str) -> io::Result<Bytes> {
        let Some(file) = self.resolve(path) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing path {path:?}"),
            ));
        };
        tokio::fs::read(&file).await.map(Bytes::from)
    }
}

/// Content type guessed from the file extension.
#[must_use]
pub fn content_type(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
