//! Error types for the membership store.

use thiserror::Error;

/// Result type alias for membership store operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors that can occur reading or writing the membership file.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("failed to read membership file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write membership file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed membership file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}
