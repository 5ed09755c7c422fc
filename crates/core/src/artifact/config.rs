//! Configuration for the artifact module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the file system artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded inputs while their job is alive.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("cutout-uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

impl StorageConfig {
    /// Creates a config rooted at `temp_dir`.
    pub fn with_temp_dir(temp_dir: PathBuf) -> Self {
        Self { temp_dir }
    }
}
