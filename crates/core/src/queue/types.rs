//! Types for the queue module.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::transform::{TransformOptions, TransformOutput};

/// Identifier assigned to a job at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload metadata captured at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Everything needed to admit a job.
///
/// If admission fails the request comes back inside [`Rejected`], and the
/// caller still owns (and must release) the artifact.
#[derive(Debug)]
pub struct JobRequest {
    pub metadata: JobMetadata,
    pub artifact: Artifact,
    pub options: TransformOptions,
}

/// Why a job ended without output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine failed, timed out or panicked.
    Transform,
    /// The job was dropped before it could deliver a result.
    Abandoned,
    /// The job was still queued when the service gave up waiting for it.
    Cancelled,
}

/// Structured failure delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn transform(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transform,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "Job was cancelled before it started".to_string(),
        }
    }

    pub fn abandoned() -> Self {
        Self {
            kind: FailureKind::Abandoned,
            message: "Job ended without producing a result".to_string(),
        }
    }
}

/// Final result of a job, delivered exactly once.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(TransformOutput),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectReason {
    /// The queue is at capacity; retry later.
    Busy { queued: usize, capacity: usize },
    /// The scheduler no longer accepts work.
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy { queued, capacity } => {
                write!(f, "queue is full ({}/{} jobs waiting)", queued, capacity)
            }
            Self::ShuttingDown => f.write_str("service is shutting down"),
        }
    }
}

/// A refused submission. Hands the request (and its artifact) back.
#[derive(Debug, thiserror::Error)]
#[error("Job rejected: {reason}")]
pub struct Rejected {
    pub reason: RejectReason,
    pub request: JobRequest,
}

impl Rejected {
    /// Returns the request so the caller can release its artifact.
    pub fn into_request(self) -> JobRequest {
        self.request
    }
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Whether new submissions are accepted.
    pub running: bool,
    /// Jobs waiting for a slot.
    pub queued_jobs: usize,
    /// Jobs being processed.
    pub active_jobs: usize,
    pub max_queue_length: usize,
    pub max_concurrency: usize,
    /// Jobs admitted since startup.
    pub total_submitted: u64,
    /// Submissions refused since startup.
    pub total_rejected: u64,
    pub total_completed: u64,
    pub total_failed: u64,
}
