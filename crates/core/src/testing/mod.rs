//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the engine and storage
//! traits, so the scheduler and HTTP layer can be tested without `rembg` or
//! a writable temp directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use cutout_core::testing::{MockArtifactStore, MockTransformer};
//!
//! let transformer = Arc::new(MockTransformer::new());
//! let store = Arc::new(MockArtifactStore::new());
//!
//! transformer.set_delay(Duration::from_millis(50)).await;
//! transformer.fail_call(0).await;
//!
//! let scheduler = JobScheduler::new(QueueConfig::default(), transformer.clone(), store.clone());
//! ```

mod mock_artifact_store;
mod mock_transformer;

pub use mock_artifact_store::MockArtifactStore;
pub use mock_transformer::{MockTransformer, RecordedTransform};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::artifact::{ArtifactError, ArtifactStore};
    use crate::queue::{JobMetadata, JobRequest};
    use crate::transform::TransformOptions;

    /// Smallest valid PNG: a 1x1 transparent pixel.
    pub const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    /// Persist `TINY_PNG` under `name` and wrap it in a request.
    pub async fn png_request(
        store: &dyn ArtifactStore,
        name: &str,
    ) -> Result<JobRequest, ArtifactError> {
        let artifact = store.persist(TINY_PNG, name).await?;
        Ok(JobRequest {
            metadata: JobMetadata {
                original_name: name.to_string(),
                mime_type: "image/png".to_string(),
                size_bytes: TINY_PNG.len() as u64,
            },
            artifact,
            options: TransformOptions::default(),
        })
    }
}
