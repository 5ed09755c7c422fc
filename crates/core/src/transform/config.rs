//! Configuration for the transform module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder replaced by the input artifact path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the output file path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by the output format extension.
pub const FORMAT_PLACEHOLDER: &str = "{format}";

/// Configuration for the command-based transformer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Path or name of the engine binary.
    #[serde(default = "default_command")]
    pub command: PathBuf,

    /// Arguments; `{input}`, `{output}` and `{format}` are substituted.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Directory where the engine writes its output.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Timeout for a single transform in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Flag used to pass encoder quality, if the engine has one.
    #[serde(default)]
    pub quality_arg: Option<String>,
}

fn default_command() -> PathBuf {
    PathBuf::from("rembg")
}

fn default_args() -> Vec<String> {
    vec![
        "i".to_string(),
        INPUT_PLACEHOLDER.to_string(),
        OUTPUT_PLACEHOLDER.to_string(),
    ]
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("cutout-output")
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            work_dir: default_work_dir(),
            timeout_secs: default_timeout(),
            quality_arg: None,
        }
    }
}

impl TransformerConfig {
    /// Creates a config for a custom command line.
    pub fn with_command(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Default::default()
        }
    }

    /// Sets the work directory.
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the quality flag.
    pub fn with_quality_arg(mut self, arg: impl Into<String>) -> Self {
        self.quality_arg = Some(arg.into());
        self
    }
}
