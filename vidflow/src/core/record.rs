//! The job record and its lifecycle transitions.
//!
//! Records are immutable values; every transition returns a new record so
//! the orchestrator can publish whole snapshots.

use super::{JobContext, JobId, JobRequest, JobStatus, JobType};
use crate::errors::{InvalidTransitionError, StageError};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Highest progress value.
pub const MAX_PROGRESS: u8 = 100;

/// State of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier.
    pub id: JobId,
    /// Pipeline variant.
    pub job_type: JobType,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Stage in progress, or the failing stage once `failed`.
    pub current_stage: Option<String>,
    /// Percentage of pipeline weight completed.
    pub progress: u8,
    /// Accumulated stage outputs.
    pub context: JobContext,
    /// Failure detail, present only when `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    /// Why the job was cancelled, present only when `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// The submitted request.
    pub request: JobRequest,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the orchestrator started.
    pub started_at: Option<Timestamp>,
    /// When a terminal status was written.
    pub completed_at: Option<Timestamp>,
    /// When the record last changed.
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Creates a pending record for `request`.
    #[must_use]
    pub fn new(id: JobId, request: JobRequest) -> Self {
        let now = now_utc();
        Self {
            id,
            job_type: request.job_type,
            status: JobStatus::Pending,
            current_stage: None,
            progress: 0,
            context: request.initial_context(),
            error: None,
            cancel_reason: None,
            request,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Returns true once the record holds a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&self, to: JobStatus) -> Result<Self, InvalidTransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransitionError {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        let mut next = self.clone();
        next.status = to;
        next.updated_at = now_utc();
        Ok(next)
    }

    /// `pending → processing`, positioned on `first_stage`.
    ///
    /// # Errors
    ///
    /// Fails unless the record is pending.
    pub fn start(&self, first_stage: Option<&str>) -> Result<Self, InvalidTransitionError> {
        let mut next = self.transition(JobStatus::Processing)?;
        next.started_at = Some(next.updated_at);
        next.current_stage = first_stage.map(str::to_string);
        Ok(next)
    }

    /// `processing → processing` after a successful stage.
    ///
    /// Credits `weight` (clamped to 100), replaces the context and moves to
    /// `next_stage`.
    ///
    /// # Errors
    ///
    /// Fails unless the record is processing.
    pub fn advance(
        &self,
        weight: u8,
        context: JobContext,
        next_stage: Option<&str>,
    ) -> Result<Self, InvalidTransitionError> {
        if self.status != JobStatus::Processing {
            return Err(InvalidTransitionError {
                job_id: self.id,
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        let mut next = self.transition(JobStatus::Processing)?;
        next.progress = self.progress.saturating_add(weight).min(MAX_PROGRESS);
        next.context = context;
        next.current_stage = next_stage.map(str::to_string);
        Ok(next)
    }

    /// `processing → completed`.
    ///
    /// # Errors
    ///
    /// Fails unless the record is processing.
    pub fn complete(&self) -> Result<Self, InvalidTransitionError> {
        let mut next = self.transition(JobStatus::Completed)?;
        next.progress = MAX_PROGRESS;
        next.current_stage = None;
        next.completed_at = Some(next.updated_at);
        Ok(next)
    }

    /// `processing → failed`. Progress and current stage stay where they are.
    ///
    /// # Errors
    ///
    /// Fails unless the record is processing.
    pub fn fail(&self, error: StageError) -> Result<Self, InvalidTransitionError> {
        let mut next = self.transition(JobStatus::Failed)?;
        next.current_stage = Some(error.stage_name.clone());
        next.error = Some(error);
        next.completed_at = Some(next.updated_at);
        Ok(next)
    }

    /// `processing → cancelled`. Progress stays where it is.
    ///
    /// # Errors
    ///
    /// Fails unless the record is processing.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<Self, InvalidTransitionError> {
        let mut next = self.transition(JobStatus::Cancelled)?;
        next.current_stage = None;
        next.cancel_reason = Some(reason.into());
        next.completed_at = Some(next.updated_at);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GenerationOptions, StageOutput};
    use pretty_assertions::assert_eq;

    fn pending() -> JobRecord {
        let request = JobRequest::new(
            JobType::VideoGeneration,
            ["doc-1"],
            GenerationOptions::new("Black holes"),
        );
        JobRecord::new(JobId::new(), request)
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = pending();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.current_stage.is_none());
        assert!(record.started_at.is_none());
        assert!(record.context.contains_key("request.title"));
    }

    #[test]
    fn test_happy_path() {
        let record = pending().start(Some("stage1")).unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert!(record.started_at.is_some());
        assert_eq!(record.current_stage.as_deref(), Some("stage1"));

        let ctx = record
            .context
            .merged("stage1", StageOutput::value("concepts", serde_json::json!([])))
            .unwrap();
        let record = record.advance(20, ctx, Some("stage2")).unwrap();
        assert_eq!(record.progress, 20);
        assert_eq!(record.current_stage.as_deref(), Some("stage2"));

        let record = record.complete().unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert!(record.current_stage.is_none());
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_progress_clamped() {
        let record = pending().start(Some("a")).unwrap();
        let ctx = record.context.clone();
        let record = record.advance(90, ctx.clone(), Some("b")).unwrap();
        let record = record.advance(90, ctx, None).unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_fail_keeps_progress_and_stage() {
        let record = pending().start(Some("stage1")).unwrap();
        let ctx = record.context.clone();
        let record = record.advance(20, ctx, Some("stage2")).unwrap();
        let record = record
            .fail(StageError::invalid_input("stage2", "missing concepts"))
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, 20);
        assert_eq!(record.current_stage.as_deref(), Some("stage2"));
        assert!(record.error.is_some());
        assert!(record.cancel_reason.is_none());
    }

    #[test]
    fn test_cancel_clears_stage() {
        let record = pending().start(Some("stage1")).unwrap().cancel("user").unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert_eq!(record.progress, 0);
        assert!(record.current_stage.is_none());
        assert!(record.error.is_none());
        assert_eq!(record.cancel_reason.as_deref(), Some("user"));
    }

    #[test]
    fn test_terminal_is_final() {
        let done = pending().start(None).unwrap().complete().unwrap();
        assert!(done.complete().is_err());
        assert!(done.cancel("late").is_err());
        assert!(done.fail(StageError::upstream("x", "y")).is_err());
        assert!(done.advance(1, done.context.clone(), None).is_err());
    }

    #[test]
    fn test_pending_cannot_skip_processing() {
        let record = pending();
        let err = record.complete().unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(err.to, JobStatus::Completed);
        assert!(record.advance(10, record.context.clone(), None).is_err());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = pending().start(Some("analyze")).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: JobRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
