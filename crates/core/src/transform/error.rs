//! Error types for the transform module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`Transformer`](super::Transformer).
///
/// Callers see every variant as the same failure class; the variants exist
/// for logs.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Engine binary not found.
    #[error("Transform command not found: {path}")]
    CommandNotFound { path: PathBuf },

    /// Input artifact does not exist or is unreadable.
    #[error("Input not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The engine ran and failed.
    #[error("Transform failed: {reason}")]
    Failed {
        reason: String,
        stderr: Option<String>,
    },

    /// The engine did not finish within the deadline.
    #[error("Transform timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The engine exited successfully but produced nothing.
    #[error("Transform produced no output")]
    EmptyOutput,

    /// The engine panicked.
    #[error("Transform panicked: {0}")]
    Panicked(String),

    /// I/O error while running the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    /// Creates a failed error with captured stderr.
    pub fn failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            stderr,
        }
    }
}
