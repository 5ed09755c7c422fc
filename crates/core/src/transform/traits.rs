//! Trait definitions for the transform module.

use async_trait::async_trait;
use std::path::Path;

use super::error::TransformError;
use super::types::{TransformOptions, TransformOutput};

/// The external image-processing engine.
///
/// Implementations are expected to be slow (seconds) and memory hungry; the
/// scheduler decides how many calls run at once.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Returns the name of this transformer implementation.
    fn name(&self) -> &str;

    /// Removes the background of the image at `input`.
    ///
    /// `input` must exist and be readable for the duration of the call.
    async fn transform(
        &self,
        input: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError>;

    /// Validates that the engine is installed and ready.
    async fn validate(&self) -> Result<(), TransformError>;

    /// Returns the accepted input MIME types.
    fn supported_input_types(&self) -> &[&str] {
        &["image/png", "image/jpeg", "image/webp"]
    }
}
