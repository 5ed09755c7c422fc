//! Error types for the artifact module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting an artifact.
///
/// Release never returns an error; see
/// [`ArtifactStore::release`](super::ArtifactStore::release).
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Nothing to store.
    #[error("Artifact is empty")]
    Empty,

    /// Storage directory could not be created.
    #[error("Failed to create storage directory: {path}")]
    DirectoryFailed { path: PathBuf },

    /// I/O error while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
