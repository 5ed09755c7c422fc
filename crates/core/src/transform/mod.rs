//! Transform module: the boundary to the background-removal engine.
//!
//! This module provides the `Transformer` trait and a command-line
//! implementation that runs an external tool (by default `rembg`) once per
//! job.
//!
//! # Example
//!
//! ```ignore
//! use cutout_core::transform::{CommandTransformer, Transformer, TransformOptions};
//!
//! let transformer = CommandTransformer::with_defaults();
//! transformer.validate().await?;
//!
//! let output = transformer
//!     .transform(Path::new("/tmp/cutout-uploads/photo.jpg"), &TransformOptions::default())
//!     .await?;
//! println!("{} bytes of {}", output.bytes.len(), output.content_type);
//! ```

mod command;
mod config;
mod error;
mod traits;
mod types;

pub use command::CommandTransformer;
pub use config::{
    TransformerConfig, FORMAT_PLACEHOLDER, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER,
};
pub use error::TransformError;
pub use traits::Transformer;
pub use types::{OutputFormat, TransformOptions, TransformOutput};
