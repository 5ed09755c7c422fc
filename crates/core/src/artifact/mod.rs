//! Artifact module: ephemeral per-job input files.
//!
//! An [`Artifact`] is created when an upload is persisted and must be released
//! exactly once, by whoever owns it at the time the job ends (or is rejected).
//!
//! # Example
//!
//! ```ignore
//! use cutout_core::artifact::{ArtifactStore, FsArtifactStore, StorageConfig};
//!
//! let store = FsArtifactStore::new(StorageConfig::default());
//! let artifact = store.persist(&bytes, "photo.jpg").await?;
//! // ... hand it to a job ...
//! store.release(&artifact).await;
//! ```

mod config;
mod error;
mod fs_store;
mod traits;
mod types;

pub use config::StorageConfig;
pub use error::ArtifactError;
pub use fs_store::FsArtifactStore;
pub use traits::ArtifactStore;
pub use types::{Artifact, ArtifactId};
