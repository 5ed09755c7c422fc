//! Trait definitions for the artifact module.

use async_trait::async_trait;

use super::error::ArtifactError;
use super::types::Artifact;

/// Owns the lifecycle of ephemeral job inputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Writes `data` as a new artifact and returns the exclusive handle.
    ///
    /// `original_name` is only used to keep a recognizable extension.
    async fn persist(&self, data: &[u8], original_name: &str) -> Result<Artifact, ArtifactError>;

    /// Deletes the artifact.
    ///
    /// Idempotent and infallible from the caller's point of view: a missing
    /// artifact is a no-op, and any other failure is logged and counted.
    async fn release(&self, artifact: &Artifact);
}
