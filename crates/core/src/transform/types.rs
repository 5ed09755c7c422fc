//! Types for the transform module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encoding of the transformed image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel.
    #[default]
    Png,
    /// WebP with alpha channel.
    Webp,
}

impl OutputFormat {
    /// Returns the MIME type served for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// Returns the file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unsupported output format: {}", other)),
        }
    }
}

/// Output tuning passed through to the engine.
///
/// Carries no information relevant to admission or scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Target encoding.
    #[serde(default)]
    pub format: OutputFormat,
    /// Encoder quality, 1..=100, when the engine supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

impl TransformOptions {
    /// Sets the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the encoder quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// Result of a successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Encoded output image.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub content_type: String,
    /// Wall-clock time spent in the engine.
    pub duration_ms: u64,
}
