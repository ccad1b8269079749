//! Backend error types.
//!
//! Defined in `qa-automator-core` so callers can downcast an
//! `anyhow::Error` from any backend without string matching.

use thiserror::Error;

/// Errors that can occur while a backend judges a criterion.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The model server could not be reached, timed out, or answered with a
    /// non-success status.
    #[error("failed to connect to Ollama at {host}. Is `ollama serve` running? ({detail})")]
    Connection { host: String, detail: String },

    /// The keyword pass threshold is outside `[0, 1]`.
    #[error("pass threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f64),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl BackendError {
    /// Returns `true` if this error came from the network round trip.
    pub fn is_connection(&self) -> bool {
        matches!(self, BackendError::Connection { .. })
    }
}
