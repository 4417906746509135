//! Error types for the lifecycle pipelines.
//!
//! Callers treat any of these as a single opaque failure signal; the
//! detail is for the logs.

use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors that can occur during a provision or decommission pipeline.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    HttpStatus {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{endpoint} reported failure: {detail}")]
    Api {
        endpoint: &'static str,
        detail: String,
    },

    #[error("unexpected {endpoint} response shape: {reason}")]
    Shape {
        endpoint: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Membership(#[from] esherd_membership::MembershipError),
}
