use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides. Nested keys are separated by `__`,
/// e.g. `CUTOUT_QUEUE__MAX_QUEUE_LENGTH=5`.
const ENV_PREFIX: &str = "CUTOUT_";

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(env_overrides())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(env_overrides())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[queue]
max_queue_length = 5
pacing_delay_ms = 0
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.queue.max_queue_length, 5);
        assert_eq!(config.queue.pacing_delay_ms, 0);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let toml = r#"
[queue]
max_queue_length = "three"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3100

[transformer]
command = "/usr/local/bin/rembg"
timeout_secs = 60
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3100);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(
            config.transformer.command,
            std::path::PathBuf::from("/usr/local/bin/rembg")
        );
        assert_eq!(config.transformer.timeout_secs, 60);
        assert_eq!(config.queue.max_queue_length, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cutout.toml",
                r#"
[queue]
max_queue_length = 4
"#,
            )?;
            jail.set_env("CUTOUT_QUEUE__MAX_QUEUE_LENGTH", "9");
            jail.set_env("CUTOUT_SERVER__PORT", "4000");

            let config = load_config(Path::new("cutout.toml")).expect("config loads");
            assert_eq!(config.queue.max_queue_length, 9);
            assert_eq!(config.server.port, 4000);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_env_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CUTOUT_QUEUE__PACING_DELAY_MS", "0");

            let config = load_config_from_env().expect("config loads");
            assert_eq!(config.queue.pacing_delay_ms, 0);
            assert_eq!(config.queue.max_concurrency, 1);
            assert_eq!(config.server.port, 3000);
            Ok(())
        });
    }
}
