//! Admission control and serialized execution.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::artifact::{Artifact, ArtifactStore};
use crate::metrics::{JOBS_FINISHED, JOBS_SUBMITTED, QUEUE_WAIT, TRANSFORM_DURATION};
use crate::transform::{TransformError, TransformOptions, Transformer};

use super::config::QueueConfig;
use super::sink::{JobHandle, ResultSink};
use super::types::{
    JobFailure, JobId, JobMetadata, JobOutcome, JobRequest, JobState, QueueStatus, RejectReason,
    Rejected,
};

/// Called on every job state change.
///
/// `Queued` and `Processing` are reported while the scheduler lock is held, so
/// the callback must be quick and must not call back into the scheduler.
pub type JobUpdateCallback = Arc<dyn Fn(&JobId, JobState) + Send + Sync>;

/// Best-effort memory reclamation hint, run after each job.
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

/// An admitted job.
struct Job {
    id: JobId,
    metadata: JobMetadata,
    artifact: Artifact,
    options: TransformOptions,
    state: JobState,
    sink: ResultSink,
    enqueued_at: DateTime<Utc>,
}

impl Job {
    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal job transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }
}

/// Queue and slot accounting. Only ever touched under the mutex.
struct SchedulerState {
    queue: VecDeque<Job>,
    active: usize,
    running: bool,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }
}

#[derive(Default)]
struct SchedulerStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Frees an execution slot when dropped and starts the next queued job.
///
/// Runs on unwind too, so a panicking hook or store cannot strand the queue.
struct SlotGuard {
    dispatcher: Dispatcher,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut state = self.dispatcher.lock_state();
        state.active = state.active.saturating_sub(1);
        self.dispatcher.dispatch_locked(&mut state);
        if state.is_idle() {
            self.dispatcher.idle.notify_waiters();
        }
    }
}

/// Everything an executing job needs. Cloned into every spawned task.
#[derive(Clone)]
struct Dispatcher {
    config: QueueConfig,
    transformer: Arc<dyn Transformer>,
    store: Arc<dyn ArtifactStore>,
    state: Arc<Mutex<SchedulerState>>,
    stats: Arc<SchedulerStats>,
    idle: Arc<Notify>,
    update_callback: Option<JobUpdateCallback>,
    reclaim_hook: Option<ReclaimHook>,
}

impl Dispatcher {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_update(&self, id: &JobId, state: JobState) {
        if let Some(ref callback) = self.update_callback {
            callback(id, state);
        }
    }

    fn dispatch_locked(&self, state: &mut SchedulerState) {
        // Slot guards can drop while the runtime shuts down; leave the queue as is.
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        while state.active < self.config.max_concurrency {
            let Some(mut job) = state.queue.pop_front() else {
                break;
            };
            state.active += 1;
            job.advance(JobState::Processing);
            self.emit_update(&job.id, JobState::Processing);

            let waited = (Utc::now() - job.enqueued_at).num_milliseconds().max(0) as f64 / 1000.0;
            QUEUE_WAIT.with_label_values(&[]).observe(waited);

            tracing::debug!(
                job_id = %job.id,
                active = state.active,
                queued = state.queue.len(),
                "Job dispatched"
            );

            runtime.spawn(self.clone().execute(job));
        }
    }

    /// Runs one job to a terminal state. Dropping the slot re-arms dispatch.
    async fn execute(self, mut job: Job) {
        let slot = SlotGuard {
            dispatcher: self.clone(),
        };
        let start = Instant::now();

        tracing::info!(
            job_id = %job.id,
            original_name = %job.metadata.original_name,
            mime_type = %job.metadata.mime_type,
            size_bytes = job.metadata.size_bytes,
            "Processing job"
        );

        // Run the engine in its own task so a panic surfaces as a JoinError.
        let transformer = Arc::clone(&self.transformer);
        let input = job.artifact.path().to_path_buf();
        let options = job.options.clone();
        let result = match tokio::spawn(async move { transformer.transform(&input, &options).await })
            .await
        {
            Ok(result) => result,
            Err(e) => Err(TransformError::Panicked(e.to_string())),
        };

        let elapsed = start.elapsed();

        // Cleanup happens before delivery so a failed delivery cannot skip it.
        self.store.release(&job.artifact).await;

        let outcome = match result {
            Ok(output) => {
                job.advance(JobState::Completed);
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                JOBS_FINISHED.with_label_values(&["completed"]).inc();
                TRANSFORM_DURATION
                    .with_label_values(&["completed"])
                    .observe(elapsed.as_secs_f64());
                tracing::info!(
                    job_id = %job.id,
                    duration_ms = elapsed.as_millis() as u64,
                    output_bytes = output.bytes.len(),
                    "Job completed"
                );
                JobOutcome::Completed(output)
            }
            Err(e) => {
                job.advance(JobState::Failed);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                JOBS_FINISHED.with_label_values(&["failed"]).inc();
                TRANSFORM_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed.as_secs_f64());
                if let TransformError::Failed {
                    stderr: Some(ref stderr),
                    ..
                } = e
                {
                    tracing::debug!(job_id = %job.id, stderr = %stderr, "Engine stderr");
                }
                tracing::warn!(
                    job_id = %job.id,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Job failed"
                );
                JobOutcome::Failed(JobFailure::transform(e.to_string()))
            }
        };

        self.emit_update(&job.id, job.state);
        job.sink.deliver(outcome);

        if let Some(ref hook) = self.reclaim_hook {
            hook();
        }

        // The slot stays taken while pacing, so queued work waits it out.
        let pacing = self.config.pacing_delay();
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        drop(slot);
    }
}

/// Bounded FIFO job queue in front of a [`Transformer`].
///
/// Admission is synchronous: a submission is either queued or rejected
/// before `submit` returns. At most `max_concurrency` jobs run at once, and
/// jobs start in the order they were admitted.
///
/// # Example
///
/// ```ignore
/// use cutout_core::queue::{JobScheduler, QueueConfig};
///
/// let scheduler = JobScheduler::new(QueueConfig::default(), transformer, store);
///
/// match scheduler.submit(request) {
///     Ok(handle) => {
///         let outcome = handle.wait().await;
///     }
///     Err(rejected) => {
///         store.release(&rejected.request.artifact).await;
///     }
/// }
/// ```
pub struct JobScheduler {
    dispatcher: Dispatcher,
}

impl JobScheduler {
    /// Creates a scheduler that accepts submissions immediately.
    pub fn new(
        config: QueueConfig,
        transformer: Arc<dyn Transformer>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher {
                config,
                transformer,
                store,
                state: Arc::new(Mutex::new(SchedulerState {
                    queue: VecDeque::new(),
                    active: 0,
                    running: true,
                })),
                stats: Arc::new(SchedulerStats::default()),
                idle: Arc::new(Notify::new()),
                update_callback: None,
                reclaim_hook: None,
            },
        }
    }

    /// Sets the state update callback.
    pub fn with_update_callback(mut self, callback: JobUpdateCallback) -> Self {
        self.dispatcher.update_callback = Some(callback);
        self
    }

    /// Sets the hook run after every job.
    pub fn with_reclaim_hook(mut self, hook: ReclaimHook) -> Self {
        self.dispatcher.reclaim_hook = Some(hook);
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.dispatcher.config
    }

    /// Returns the engine behind this scheduler.
    pub fn transformer(&self) -> &Arc<dyn Transformer> {
        &self.dispatcher.transformer
    }

    /// Admits or rejects a job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, Rejected> {
        let dispatcher = &self.dispatcher;
        let mut state = dispatcher.lock_state();

        if !state.running {
            return Err(self.reject(RejectReason::ShuttingDown, request));
        }

        let queued = state.queue.len();
        let capacity = dispatcher.config.max_queue_length;
        if queued >= capacity {
            drop(state);
            return Err(self.reject(RejectReason::Busy { queued, capacity }, request));
        }

        let JobRequest {
            metadata,
            artifact,
            options,
        } = request;

        let id = JobId::new();
        let (sink, rx) = ResultSink::channel(id);
        state.queue.push_back(Job {
            id,
            metadata,
            artifact,
            options,
            state: JobState::Queued,
            sink,
            enqueued_at: Utc::now(),
        });
        dispatcher.stats.submitted.fetch_add(1, Ordering::Relaxed);
        JOBS_SUBMITTED.with_label_values(&["accepted"]).inc();
        dispatcher.emit_update(&id, JobState::Queued);

        dispatcher.dispatch_locked(&mut state);

        let queue_position = state
            .queue
            .iter()
            .position(|job| job.id == id)
            .map(|index| index + 1);

        tracing::info!(
            job_id = %id,
            queued = state.queue.len(),
            active = state.active,
            queue_position = ?queue_position,
            "Job admitted"
        );

        Ok(JobHandle::new(id, queue_position, rx))
    }

    fn reject(&self, reason: RejectReason, request: JobRequest) -> Rejected {
        self.dispatcher.stats.rejected.fetch_add(1, Ordering::Relaxed);
        let label = match reason {
            RejectReason::Busy { .. } => "busy",
            RejectReason::ShuttingDown => "shutting_down",
        };
        JOBS_SUBMITTED.with_label_values(&[label]).inc();
        tracing::warn!(
            original_name = %request.metadata.original_name,
            %reason,
            "Job rejected"
        );
        Rejected { reason, request }
    }

    /// Returns the current queue status.
    pub fn status(&self) -> QueueStatus {
        let dispatcher = &self.dispatcher;
        let state = dispatcher.lock_state();
        QueueStatus {
            running: state.running,
            queued_jobs: state.queue.len(),
            active_jobs: state.active,
            max_queue_length: dispatcher.config.max_queue_length,
            max_concurrency: dispatcher.config.max_concurrency,
            total_submitted: dispatcher.stats.submitted.load(Ordering::Relaxed),
            total_rejected: dispatcher.stats.rejected.load(Ordering::Relaxed),
            total_completed: dispatcher.stats.completed.load(Ordering::Relaxed),
            total_failed: dispatcher.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting submissions. Admitted jobs still run to completion.
    pub fn shutdown(&self) {
        let mut state = self.dispatcher.lock_state();
        if state.running {
            state.running = false;
            tracing::info!(
                queued = state.queue.len(),
                active = state.active,
                "Scheduler stopped accepting jobs"
            );
        }
    }

    /// Fails every job still waiting in the queue and releases its artifact.
    ///
    /// Jobs already processing are left alone. Returns how many jobs were
    /// cancelled.
    pub async fn cancel_queued(&self) -> usize {
        let dispatcher = &self.dispatcher;
        let cancelled: Vec<Job> = dispatcher.lock_state().queue.drain(..).collect();
        let count = cancelled.len();

        for mut job in cancelled {
            dispatcher.store.release(&job.artifact).await;
            job.advance(JobState::Failed);
            dispatcher.stats.failed.fetch_add(1, Ordering::Relaxed);
            JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
            dispatcher.emit_update(&job.id, job.state);
            tracing::warn!(job_id = %job.id, "Queued job cancelled");
            job.sink.deliver(JobOutcome::Failed(JobFailure::cancelled()));
        }

        let state = dispatcher.lock_state();
        if state.is_idle() {
            dispatcher.idle.notify_waiters();
        }
        count
    }

    /// Waits until no job is queued or processing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.dispatcher.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.dispatcher.lock_state().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FailureKind;
    use crate::testing::fixtures::png_request;
    use crate::testing::{MockArtifactStore, MockTransformer};
    use std::time::Duration;

    fn scheduler_with(config: QueueConfig) -> (JobScheduler, MockTransformer, MockArtifactStore) {
        let transformer = MockTransformer::new();
        let store = MockArtifactStore::new();
        let scheduler = JobScheduler::new(
            config,
            Arc::new(transformer.clone()),
            Arc::new(store.clone()),
        );
        (scheduler, transformer, store)
    }

    fn no_pacing() -> QueueConfig {
        QueueConfig::default().with_pacing_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_cold_submit_starts_immediately() {
        let (scheduler, transformer, store) = scheduler_with(QueueConfig::default());
        transformer.set_delay(Duration::from_millis(200)).await;

        let handle = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();

        assert_eq!(handle.queue_position(), None);
        let status = scheduler.status();
        assert_eq!(status.active_jobs, 1);
        assert_eq!(status.queued_jobs, 0);
    }

    #[tokio::test]
    async fn test_success_delivers_output_and_releases() {
        let (scheduler, _transformer, store) = scheduler_with(no_pacing());

        let request = png_request(&store, "a.png").await.unwrap();
        let artifact_id = request.artifact.id();
        let handle = scheduler.submit(request).unwrap();

        match handle.wait().await {
            JobOutcome::Completed(output) => assert_eq!(output.content_type, "image/png"),
            JobOutcome::Failed(failure) => panic!("unexpected failure: {:?}", failure),
        }
        assert_eq!(store.release_count(artifact_id).await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_classified_and_releases() {
        let (scheduler, transformer, store) = scheduler_with(no_pacing());
        transformer.fail_call(0).await;

        let request = png_request(&store, "a.png").await.unwrap();
        let artifact_id = request.artifact.id();
        let outcome = scheduler.submit(request).unwrap().wait().await;

        match outcome {
            JobOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Transform),
            JobOutcome::Completed(_) => panic!("expected failure"),
        }
        assert_eq!(store.release_count(artifact_id).await, 1);

        scheduler.wait_idle().await;
        assert_eq!(scheduler.status().total_failed, 1);
    }

    #[tokio::test]
    async fn test_panicking_engine_is_a_failure() {
        let (scheduler, transformer, store) = scheduler_with(no_pacing());
        transformer.panic_call(0).await;

        let request = png_request(&store, "a.png").await.unwrap();
        let artifact_id = request.artifact.id();
        let outcome = scheduler.submit(request).unwrap().wait().await;

        assert!(!outcome.is_success());
        assert_eq!(store.release_count(artifact_id).await, 1);

        scheduler.wait_idle().await;
        assert_eq!(scheduler.status().active_jobs, 0);
    }

    #[tokio::test]
    async fn test_busy_rejection_returns_request() {
        let (scheduler, transformer, store) =
            scheduler_with(QueueConfig::default().with_max_queue_length(1));
        transformer.set_delay(Duration::from_millis(300)).await;

        let _running = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();
        let queued = scheduler
            .submit(png_request(&store, "b.png").await.unwrap())
            .unwrap();
        assert_eq!(queued.queue_position(), Some(1));

        let rejected = scheduler
            .submit(png_request(&store, "c.png").await.unwrap())
            .unwrap_err();
        assert_eq!(
            rejected.reason,
            RejectReason::Busy {
                queued: 1,
                capacity: 1
            }
        );
        assert_eq!(rejected.request.metadata.original_name, "c.png");
        assert_eq!(store.release_count(rejected.request.artifact.id()).await, 0);
        assert_eq!(scheduler.status().total_rejected, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let (scheduler, _transformer, store) = scheduler_with(QueueConfig::default());
        scheduler.shutdown();

        let rejected = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap_err();
        assert_eq!(rejected.reason, RejectReason::ShuttingDown);
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_when_drained() {
        let (scheduler, transformer, store) =
            scheduler_with(QueueConfig::default().with_pacing_delay(Duration::from_millis(10)));
        transformer.set_delay(Duration::from_millis(20)).await;

        let first = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();
        let second = scheduler
            .submit(png_request(&store, "b.png").await.unwrap())
            .unwrap();
        scheduler.shutdown();

        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
            .await
            .expect("scheduler did not drain");

        assert!(first.wait().await.is_success());
        assert!(second.wait().await.is_success());
        assert!(store.all_released_once().await);
    }

    #[tokio::test]
    async fn test_reclaim_hook_runs_after_each_job() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let (scheduler, _transformer, store) = scheduler_with(no_pacing());
        let scheduler = scheduler.with_reclaim_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let first = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();
        let second = scheduler
            .submit(png_request(&store, "b.png").await.unwrap())
            .unwrap();
        first.wait().await;
        second.wait().await;
        scheduler.wait_idle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_reclaim_hook_does_not_strand_queue() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let (scheduler, transformer, store) = scheduler_with(no_pacing());
        transformer.set_delay(Duration::from_millis(50)).await;
        let scheduler = scheduler.with_reclaim_hook(Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("reclaim hook failed");
            }
        }));

        let first = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();
        let second = scheduler
            .submit(png_request(&store, "b.png").await.unwrap())
            .unwrap();

        assert!(first.wait().await.is_success());
        let outcome = tokio::time::timeout(Duration::from_secs(5), second.wait())
            .await
            .expect("second job was never dispatched");
        assert!(outcome.is_success());

        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
            .await
            .expect("scheduler did not become idle");
        let status = scheduler.status();
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.queued_jobs, 0);
        assert!(store.all_released_once().await);
    }

    #[tokio::test]
    async fn test_cancel_queued_releases_waiting_jobs() {
        let (scheduler, transformer, store) = scheduler_with(no_pacing());
        transformer.set_delay(Duration::from_millis(100)).await;

        let running = scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap();
        let queued = scheduler
            .submit(png_request(&store, "b.png").await.unwrap())
            .unwrap();
        scheduler.shutdown();

        assert_eq!(scheduler.cancel_queued().await, 1);
        match queued.wait().await {
            JobOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Cancelled),
            JobOutcome::Completed(_) => panic!("queued job should be cancelled"),
        }
        assert_eq!(store.released_total().await, 1);

        assert!(running.wait().await.is_success());
        scheduler.wait_idle().await;
        assert!(store.all_released_once().await);
        assert_eq!(transformer.call_count(), 1);
        assert_eq!(scheduler.status().total_failed, 1);
    }

    #[tokio::test]
    async fn test_update_callback_sees_every_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (scheduler, _transformer, store) = scheduler_with(no_pacing());
        let scheduler = scheduler.with_update_callback(Arc::new(move |_id, state| {
            sink.lock().unwrap().push(state);
        }));

        scheduler
            .submit(png_request(&store, "a.png").await.unwrap())
            .unwrap()
            .wait()
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![JobState::Queued, JobState::Processing, JobState::Completed]
        );
    }
}
