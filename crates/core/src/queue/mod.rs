//! Queue module: admission control and serialized execution.
//!
//! Every upload becomes a job. A job is admitted only while fewer than
//! `max_queue_length` jobs are waiting; otherwise the submission is rejected
//! straight away with [`RejectReason::Busy`]. Admitted jobs run in FIFO order,
//! at most `max_concurrency` at a time, with a pacing delay after each one.
//!
//! Each admitted job ends in exactly one outcome, delivered once through its
//! [`JobHandle`], and its input artifact is released exactly once whether the
//! engine succeeded, failed or panicked.
//!
//! # Example
//!
//! ```ignore
//! use cutout_core::queue::{JobScheduler, JobOutcome, QueueConfig};
//!
//! let scheduler = JobScheduler::new(QueueConfig::default(), transformer, store);
//! let handle = scheduler.submit(request)?;
//!
//! match handle.wait().await {
//!     JobOutcome::Completed(output) => { /* send output.bytes */ }
//!     JobOutcome::Failed(failure) => { /* report failure.message */ }
//! }
//! ```

mod config;
mod scheduler;
mod sink;
mod types;

pub use config::QueueConfig;
pub use scheduler::{JobScheduler, JobUpdateCallback, ReclaimHook};
pub use sink::{JobHandle, ResultSink};
pub use types::{
    FailureKind, JobFailure, JobId, JobMetadata, JobOutcome, JobRequest, JobState, QueueStatus,
    RejectReason, Rejected,
};
