//! Exactly-once result delivery.

use tokio::sync::oneshot;

use super::types::{JobFailure, JobId, JobOutcome};

/// Delivers a job's outcome to the caller that submitted it.
///
/// `deliver` consumes the sink, so a second delivery does not compile. A sink
/// dropped without delivering sends an `Abandoned` failure instead, so the
/// caller never waits on a job that can no longer answer.
#[derive(Debug)]
pub struct ResultSink {
    job_id: JobId,
    tx: Option<oneshot::Sender<JobOutcome>>,
}

impl ResultSink {
    /// Creates a connected sink and caller handle.
    pub(crate) fn channel(job_id: JobId) -> (Self, oneshot::Receiver<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                job_id,
                tx: Some(tx),
            },
            rx,
        )
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Sends the outcome. A caller that went away is not an error.
    pub fn deliver(mut self, outcome: JobOutcome) {
        if let Some(tx) = self.tx.take() {
            if tx.send(outcome).is_err() {
                tracing::debug!(job_id = %self.job_id, "Caller went away before the result was ready");
            }
        }
    }
}

impl Drop for ResultSink {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!(job_id = %self.job_id, "Job dropped without a result");
            let _ = tx.send(JobOutcome::Failed(JobFailure::abandoned()));
        }
    }
}

/// Caller side of an admitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    queue_position: Option<usize>,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        queue_position: Option<usize>,
        rx: oneshot::Receiver<JobOutcome>,
    ) -> Self {
        Self {
            id,
            queue_position,
            rx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// 1-based position in the queue at admission, or `None` if the job
    /// started immediately.
    pub fn queue_position(&self) -> Option<usize> {
        self.queue_position
    }

    /// Waits for the job's outcome.
    pub async fn wait(self) -> JobOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| JobOutcome::Failed(JobFailure::abandoned()))
    }
}
