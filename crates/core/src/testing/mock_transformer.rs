//! Mock transformer for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::transform::{TransformError, TransformOptions, TransformOutput, Transformer};

/// A recorded transform call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTransform {
    /// Input path the engine was handed.
    pub input: PathBuf,
    /// Options the job was submitted with.
    pub options: TransformOptions,
    /// Whether the call succeeded.
    pub success: bool,
}

/// Mock implementation of the Transformer trait.
///
/// Provides controllable behavior for testing:
/// - Record calls in the order they started
/// - Fail or panic on chosen calls (0-based)
/// - Simulate engine duration
/// - Track how many calls overlapped
///
/// # Example
///
/// ```rust,ignore
/// use cutout_core::testing::MockTransformer;
///
/// let transformer = MockTransformer::new();
/// transformer.set_delay(Duration::from_millis(50)).await;
/// transformer.fail_call(1).await;
///
/// // ... run jobs through a scheduler ...
///
/// assert_eq!(transformer.max_in_flight(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockTransformer {
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedTransform>>>,
    /// Call indices that fail.
    fail_calls: Arc<RwLock<HashSet<usize>>>,
    /// Call indices that panic.
    panic_calls: Arc<RwLock<HashSet<usize>>>,
    /// Simulated engine duration in milliseconds.
    delay_ms: Arc<RwLock<u64>>,
    /// Calls started so far.
    started: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransformer {
    /// Create a new mock transformer with no delay.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            fail_calls: Arc::new(RwLock::new(HashSet::new())),
            panic_calls: Arc::new(RwLock::new(HashSet::new())),
            delay_ms: Arc::new(RwLock::new(0)),
            started: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the simulated engine duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay_ms.write().await = delay.as_millis() as u64;
    }

    /// Make the `index`-th call (0-based) fail.
    pub async fn fail_call(&self, index: usize) {
        self.fail_calls.write().await.insert(index);
    }

    /// Make the `index`-th call (0-based) panic.
    pub async fn panic_call(&self, index: usize) {
        self.panic_calls.write().await.insert(index);
    }

    /// Get all recorded calls, in the order they started.
    pub async fn recorded_calls(&self) -> Vec<RecordedTransform> {
        self.calls.read().await.clone()
    }

    /// Number of calls started.
    pub fn call_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even if the call panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn transform(
        &self,
        input: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        let index = self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let fail = self.fail_calls.read().await.contains(&index);
        self.calls.write().await.push(RecordedTransform {
            input: input.to_path_buf(),
            options: options.clone(),
            success: !fail,
        });

        let delay_ms = *self.delay_ms.read().await;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if self.panic_calls.read().await.contains(&index) {
            panic!("mock transformer panicked on call {}", index);
        }

        if fail {
            return Err(TransformError::failed(
                format!("mock failure on call {}", index),
                Some("mock stderr".to_string()),
            ));
        }

        Ok(TransformOutput {
            bytes: format!("cutout:{}", input.display()).into_bytes(),
            content_type: options.format.content_type().to_string(),
            duration_ms: delay_ms,
        })
    }

    async fn validate(&self) -> Result<(), TransformError> {
        Ok(())
    }
}
