//! Types for the artifact module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Identifier of a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Exclusive handle to an ephemeral input file.
///
/// Not `Clone`: whoever holds the value is responsible for handing it to
/// [`ArtifactStore::release`](super::ArtifactStore::release).
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    id: ArtifactId,
    path: PathBuf,
    size_bytes: u64,
}

impl Artifact {
    /// Wraps an already-written file.
    pub fn new(id: ArtifactId, path: PathBuf, size_bytes: u64) -> Self {
        Self {
            id,
            path,
            size_bytes,
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}
