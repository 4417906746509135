//! Error types for config rendering and proxy process control.

use thiserror::Error;

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors from config regeneration or the proxy process.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("marker line `{marker}` not found in template")]
    MarkerMissing { marker: String },

    #[error("failed to read template {path}: {source}")]
    Template {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Config {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to read pid file {path}: {source}")]
    PidFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to spawn proxy binary for {op}: {source}")]
    Spawn {
        op: &'static str,
        source: std::io::Error,
    },

    #[error("proxy {op} failed: {detail}")]
    Control { op: &'static str, detail: String },
}
