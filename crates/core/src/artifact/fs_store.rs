//! File system artifact store.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;

use super::config::StorageConfig;
use super::error::ArtifactError;
use super::traits::ArtifactStore;
use super::types::{Artifact, ArtifactId};
use crate::metrics::CLEANUP_FAILURES;

/// Longest extension kept from the uploaded file name.
const MAX_EXTENSION_LEN: usize = 8;

/// Stores artifacts as files under a single directory.
pub struct FsArtifactStore {
    config: StorageConfig,
}

impl FsArtifactStore {
    /// Creates a new store with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Ensures the storage directory exists.
    pub async fn validate(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.config.temp_dir)
            .await
            .map_err(|_| ArtifactError::DirectoryFailed {
                path: self.config.temp_dir.clone(),
            })
    }

    /// Builds the on-disk file name, keeping a sane extension from the upload.
    fn file_name(id: ArtifactId, original_name: &str) -> String {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| {
                !e.is_empty()
                    && e.len() <= MAX_EXTENSION_LEN
                    && e.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .map(|e| e.to_ascii_lowercase());

        match extension {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn persist(&self, data: &[u8], original_name: &str) -> Result<Artifact, ArtifactError> {
        if data.is_empty() {
            return Err(ArtifactError::Empty);
        }

        self.validate().await?;

        let id = ArtifactId::new();
        let path = self.config.temp_dir.join(Self::file_name(id, original_name));
        fs::write(&path, data).await?;

        tracing::debug!(artifact_id = %id, path = ?path, size_bytes = data.len(), "Artifact persisted");

        Ok(Artifact::new(id, path, data.len() as u64))
    }

    async fn release(&self, artifact: &Artifact) {
        match fs::remove_file(artifact.path()).await {
            Ok(()) => {
                tracing::debug!(artifact_id = %artifact.id(), "Artifact released");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(artifact_id = %artifact.id(), "Artifact already released");
            }
            Err(e) => {
                CLEANUP_FAILURES.inc();
                tracing::warn!(
                    artifact_id = %artifact.id(),
                    path = ?artifact.path(),
                    error = %e,
                    "Failed to release artifact"
                );
            }
        }
    }
}
