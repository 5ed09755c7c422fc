//! Mock artifact store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::artifact::{Artifact, ArtifactError, ArtifactId, ArtifactStore};

/// In-memory implementation of the ArtifactStore trait.
///
/// Nothing touches the filesystem. Every artifact gets a path under `/mock`,
/// and every release is counted so tests can check cleanup happened exactly
/// once.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactStore {
    /// Stored bytes by artifact.
    stored: Arc<RwLock<HashMap<ArtifactId, Vec<u8>>>>,
    /// Release calls by artifact.
    releases: Arc<RwLock<HashMap<ArtifactId, usize>>>,
    /// Artifacts in persist order.
    persisted: Arc<RwLock<Vec<ArtifactId>>>,
    /// If set, the next persist will fail with this error.
    next_error: Arc<RwLock<Option<ArtifactError>>>,
    /// Simulated write latency for persist.
    persist_delay: Arc<RwLock<Duration>>,
}

impl MockArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next persist to fail.
    pub async fn set_next_error(&self, error: ArtifactError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set how long each persist takes.
    pub async fn set_persist_delay(&self, delay: Duration) {
        *self.persist_delay.write().await = delay;
    }

    /// Number of artifacts persisted so far.
    pub async fn persisted_count(&self) -> usize {
        self.persisted.read().await.len()
    }

    /// Artifacts in the order they were persisted.
    pub async fn persisted_ids(&self) -> Vec<ArtifactId> {
        self.persisted.read().await.clone()
    }

    /// Number of times `id` was released.
    pub async fn release_count(&self, id: ArtifactId) -> usize {
        self.releases.read().await.get(&id).copied().unwrap_or(0)
    }

    /// Total release calls across all artifacts.
    pub async fn released_total(&self) -> usize {
        self.releases.read().await.values().sum()
    }

    /// Artifacts persisted but not yet released.
    pub async fn live_count(&self) -> usize {
        self.stored.read().await.len()
    }

    /// Whether every persisted artifact was released exactly once.
    pub async fn all_released_once(&self) -> bool {
        let releases = self.releases.read().await;
        self.persisted
            .read()
            .await
            .iter()
            .all(|id| releases.get(id) == Some(&1))
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn persist(&self, data: &[u8], original_name: &str) -> Result<Artifact, ArtifactError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if data.is_empty() {
            return Err(ArtifactError::Empty);
        }

        let delay = *self.persist_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let id = ArtifactId::new();
        let path = PathBuf::from(format!("/mock/{}-{}", id, original_name));
        self.stored.write().await.insert(id, data.to_vec());
        self.persisted.write().await.push(id);

        Ok(Artifact::new(id, path, data.len() as u64))
    }

    async fn release(&self, artifact: &Artifact) {
        self.stored.write().await.remove(&artifact.id());
        *self
            .releases
            .write()
            .await
            .entry(artifact.id())
            .or_insert(0) += 1;
    }
}
