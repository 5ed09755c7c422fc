//! Transformer that shells out to an external background-removal tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use super::config::{
    TransformerConfig, FORMAT_PLACEHOLDER, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER,
};
use super::error::TransformError;
use super::traits::Transformer;
use super::types::{TransformOptions, TransformOutput};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Runs one engine process per transform.
///
/// The process owns all of the engine's memory, so it is returned to the OS
/// as soon as the process exits.
pub struct CommandTransformer {
    config: TransformerConfig,
}

impl CommandTransformer {
    /// Creates a new command transformer with the given configuration.
    pub fn new(config: TransformerConfig) -> Self {
        Self { config }
    }

    /// Creates a transformer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TransformerConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Builds the engine arguments for one run.
    fn build_args(&self, input: &Path, output: &Path, options: &TransformOptions) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();

        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(FORMAT_PLACEHOLDER, options.format.extension())
            })
            .collect();

        if let (Some(flag), Some(quality)) = (&self.config.quality_arg, options.quality) {
            args.push(flag.clone());
            args.push(quality.to_string());
        }

        args
    }

    fn output_path(&self, options: &TransformOptions) -> PathBuf {
        self.config
            .work_dir
            .join(format!("{}.{}", Uuid::new_v4(), options.format.extension()))
    }

    fn map_spawn_error(&self, e: std::io::Error) -> TransformError {
        if e.kind() == std::io::ErrorKind::NotFound {
            TransformError::CommandNotFound {
                path: self.config.command.clone(),
            }
        } else {
            TransformError::Io(e)
        }
    }

    /// Spawns the engine and waits for it to exit.
    async fn run_engine(&self, args: &[String]) -> Result<(), TransformError> {
        let mut child = Command::new(&self.config.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransformError::failed("stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = reader.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tail.join("\n")))
        })
        .await;

        match result {
            Ok(Ok((status, stderr))) if status.success() => {
                if !stderr.is_empty() {
                    tracing::debug!(command = ?self.config.command, stderr = %stderr, "Engine stderr");
                }
                Ok(())
            }
            Ok(Ok((status, stderr))) => Err(TransformError::failed(
                format!("engine exited with code: {:?}", status.code()),
                if stderr.is_empty() { None } else { Some(stderr) },
            )),
            Ok(Err(e)) => Err(TransformError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(TransformError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }
}

#[async_trait]
impl Transformer for CommandTransformer {
    fn name(&self) -> &str {
        "command"
    }

    async fn transform(
        &self,
        input: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        let start = Instant::now();

        if tokio::fs::metadata(input).await.is_err() {
            return Err(TransformError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let output_path = self.output_path(options);
        let args = self.build_args(input, &output_path, options);

        let run = self.run_engine(&args).await;
        let bytes = match run {
            Ok(()) => tokio::fs::read(&output_path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TransformError::EmptyOutput
                } else {
                    TransformError::Io(e)
                }
            }),
            Err(e) => Err(e),
        };

        // The engine may have written a partial file even on failure.
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = ?output_path, error = %e, "Failed to remove engine output");
            }
        }

        let bytes = bytes?;
        if bytes.is_empty() {
            return Err(TransformError::EmptyOutput);
        }

        Ok(TransformOutput {
            bytes,
            content_type: options.format.content_type().to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), TransformError> {
        let result = Command::new(&self.config.command)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Err(e) = result {
            return Err(self.map_spawn_error(e));
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::OutputFormat;
    use tempfile::TempDir;

    fn shell_transformer(script: &str, work_dir: &Path) -> CommandTransformer {
        // sh -c '<script>' <input> <output>  =>  $0 = input, $1 = output
        CommandTransformer::new(
            TransformerConfig::with_command(
                "sh",
                vec![
                    "-c".to_string(),
                    script.to_string(),
                    "{input}".to_string(),
                    "{output}".to_string(),
                ],
            )
            .with_work_dir(work_dir.to_path_buf())
            .with_timeout(5),
        )
    }

    #[test]
    fn test_build_args_substitutes_placeholders() {
        let transformer = CommandTransformer::new(
            TransformerConfig::with_command(
                "bgremove",
                vec![
                    "--input={input}".into(),
                    "-o".into(),
                    "{output}".into(),
                    "--format".into(),
                    "{format}".into(),
                ],
            )
            .with_quality_arg("-q"),
        );
        let options = TransformOptions::default()
            .with_format(OutputFormat::Webp)
            .with_quality(75);

        let args = transformer.build_args(
            Path::new("/in/a.jpg"),
            Path::new("/out/b.webp"),
            &options,
        );

        assert_eq!(
            args,
            vec!["--input=/in/a.jpg", "-o", "/out/b.webp", "--format", "webp", "-q", "75"]
        );
    }

    #[test]
    fn test_build_args_ignores_quality_without_flag() {
        let transformer = CommandTransformer::with_defaults();
        let options = TransformOptions::default().with_quality(50);
        let args = transformer.build_args(Path::new("/a.png"), Path::new("/b.png"), &options);
        assert_eq!(args, vec!["i", "/a.png", "/b.png"]);
    }

    #[test]
    fn test_output_path_uses_format_extension() {
        let transformer = CommandTransformer::new(
            TransformerConfig::default().with_work_dir(PathBuf::from("/work")),
        );
        let path = transformer.output_path(&TransformOptions::default().with_format(OutputFormat::Webp));
        assert_eq!(path.parent(), Some(Path::new("/work")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webp"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transform_success_reads_and_removes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        tokio::fs::write(&input, b"fake image").await.unwrap();

        let work_dir = dir.path().join("work");
        let transformer = shell_transformer(r#"cp "$0" "$1""#, &work_dir);

        let output = transformer
            .transform(&input, &TransformOptions::default())
            .await
            .unwrap();

        assert_eq!(output.bytes, b"fake image");
        assert_eq!(output.content_type, "image/png");

        let mut entries = tokio::fs::read_dir(&work_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transform_nonzero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        tokio::fs::write(&input, b"x").await.unwrap();

        let transformer = shell_transformer("echo 'model crashed' >&2; exit 3", dir.path());
        let err = transformer
            .transform(&input, &TransformOptions::default())
            .await
            .unwrap_err();

        match err {
            TransformError::Failed { stderr, .. } => {
                assert!(stderr.unwrap().contains("model crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transform_no_output_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        tokio::fs::write(&input, b"x").await.unwrap();

        let transformer = shell_transformer("true", dir.path());
        let err = transformer
            .transform(&input, &TransformOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::EmptyOutput));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transform_timeout() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.png");
        tokio::fs::write(&input, b"x").await.unwrap();

        let mut transformer = shell_transformer("sleep 5", dir.path());
        transformer.config.timeout_secs = 1;

        let err = transformer
            .transform(&input, &TransformOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Timeout { timeout_secs: 1 }));
    }

    #[tokio::test]
    async fn test_transform_missing_input() {
        let dir = TempDir::new().unwrap();
        let transformer = shell_transformer("true", dir.path());
        let err = transformer
            .transform(&dir.path().join("missing.png"), &TransformOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_missing_command() {
        let transformer = CommandTransformer::new(TransformerConfig::with_command(
            "/nonexistent/bin/cutout-engine",
            vec![],
        ));
        let err = transformer.validate().await.unwrap_err();
        assert!(matches!(err, TransformError::CommandNotFound { .. }));
    }
}
