//! Job lifecycle events.
//!
//! Event names are stable strings so sinks can route on prefixes
//! (`job.`, `stage.`).

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A job was accepted and recorded as pending.
pub const JOB_SUBMITTED: &str = "job.submitted";
/// A job left pending and began its first stage.
pub const JOB_STARTED: &str = "job.started";
/// A stage executor was invoked.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage's writes were merged and its weight credited.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage returned an error.
pub const STAGE_FAILED: &str = "stage.failed";
/// All stages succeeded.
pub const JOB_COMPLETED: &str = "job.completed";
/// The job ended with a stage error.
pub const JOB_FAILED: &str = "job.failed";
/// The job ended at a stage boundary after a cancellation request.
pub const JOB_CANCELLED: &str = "job.cancelled";
/// A caller requested cancellation of an active job.
pub const JOB_CANCEL_REQUESTED: &str = "job.cancel_requested";
