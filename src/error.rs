//! Error types for the dispatch engine.

use thiserror::Error;

/// Result type alias using the cadence error type.
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Crate-level error type.
///
/// Only whole-request failures surface here. Per-target failures are
/// classified into [`crate::domain::summary::FailureKind`] and folded into
/// the dispatch summary instead of aborting the batch.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// Request rejected before any dispatch step (malformed batch, message
    /// pool, transport list, or configuration).
    #[error("invalid dispatch request: {0}")]
    Intake(String),

    /// Credential rejected or the pre-flight identity check failed.
    #[error("session rejected by gateway: {0}")]
    Auth(String),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
