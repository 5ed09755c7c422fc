pub mod artifact;
pub mod config;
pub mod metrics;
pub mod queue;
pub mod testing;
pub mod transform;

pub use artifact::{Artifact, ArtifactError, ArtifactId, ArtifactStore, FsArtifactStore};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, ServerConfig, UploadConfig,
};
pub use queue::{
    JobHandle, JobId, JobMetadata, JobOutcome, JobRequest, JobScheduler, JobState, QueueConfig,
    QueueStatus, RejectReason, Rejected,
};
pub use transform::{
    CommandTransformer, OutputFormat, TransformError, TransformOptions, TransformOutput,
    Transformer,
};
