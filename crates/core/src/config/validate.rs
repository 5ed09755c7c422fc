use super::{types::Config, ConfigError};
use crate::transform::{INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Queue length and concurrency are at least 1
/// - Upload size limit is positive
/// - Engine command, timeout and argument placeholders are usable
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Queue validation
    if config.queue.max_queue_length == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_queue_length must be at least 1".to_string(),
        ));
    }
    if config.queue.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_concurrency must be at least 1".to_string(),
        ));
    }

    // Upload validation
    if config.upload.max_file_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "upload.max_file_bytes must be greater than 0".to_string(),
        ));
    }

    // Transformer validation
    let transformer = &config.transformer;
    if transformer.command.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "transformer.command cannot be empty".to_string(),
        ));
    }
    if transformer.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "transformer.timeout_secs must be greater than 0".to_string(),
        ));
    }
    for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
        if !transformer.args.iter().any(|arg| arg.contains(placeholder)) {
            return Err(ConfigError::ValidationError(format!(
                "transformer.args must contain {}",
                placeholder
            )));
        }
    }

    Ok(())
}
