//! Error types for the vidflow orchestration core.
//!
//! Stage executors fail with [`StageError`]; the registry surfaces its own
//! synchronous errors ([`JobNotFoundError`], [`JobAlreadyTerminalError`],
//! [`DuplicateJobError`], [`InvalidRequestError`]). Everything folds into
//! [`VidflowError`].

use crate::core::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for vidflow operations.
#[derive(Debug, Error)]
pub enum VidflowError {
    /// A stage failed.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// The requested job does not exist.
    #[error("{0}")]
    JobNotFound(#[from] JobNotFoundError),

    /// The job already reached a terminal status.
    #[error("{0}")]
    JobAlreadyTerminal(#[from] JobAlreadyTerminalError),

    /// A job with the same idempotency key is still active.
    #[error("{0}")]
    DuplicateJob(#[from] DuplicateJobError),

    /// The submitted request failed validation.
    #[error("{0}")]
    InvalidRequest(#[from] InvalidRequestError),

    /// A pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A job record could not be persisted or loaded.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A lifecycle transition was attempted from the wrong status.
    #[error("{0}")]
    InvalidTransition(#[from] InvalidTransitionError),
}

/// Classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageErrorCause {
    /// A collaborator failed or returned unusable output.
    UpstreamServiceError,
    /// The accumulated context was missing something the stage required.
    InvalidInput,
    /// A collaborator exceeded its time bound.
    Timeout,
    /// Collaborator-side rate limiting or quota.
    ResourceExhausted,
}

impl StageErrorCause {
    /// Returns the wire name of the cause.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamServiceError => "upstream-service-error",
            Self::InvalidInput => "invalid-input",
            Self::Timeout => "timeout",
            Self::ResourceExhausted => "resource-exhausted",
        }
    }

    /// Whether errors of this cause are retryable unless a stage says otherwise.
    #[must_use]
    pub const fn default_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ResourceExhausted)
    }
}

impl fmt::Display for StageErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure returned by a stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Stage '{stage_name}' failed ({cause}): {message}")]
pub struct StageError {
    /// The stage that failed.
    pub stage_name: String,
    /// The failure classification.
    pub cause: StageErrorCause,
    /// Whether the failure was transient.
    pub retryable: bool,
    /// Human-readable detail.
    pub message: String,
}

impl StageError {
    /// Creates a stage error with the cause's default retryability.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        cause: StageErrorCause,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            cause,
            retryable: cause.default_retryable(),
            message: message.into(),
        }
    }

    /// Creates an upstream-service error.
    #[must_use]
    pub fn upstream(stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage_name, StageErrorCause::UpstreamServiceError, message)
    }

    /// Creates an invalid-input error. These are never retryable.
    #[must_use]
    pub fn invalid_input(stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage_name, StageErrorCause::InvalidInput, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage_name, StageErrorCause::Timeout, message)
    }

    /// Creates a resource-exhausted error.
    #[must_use]
    pub fn resource_exhausted(stage_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage_name, StageErrorCause::ResourceExhausted, message)
    }

    /// Overrides the retryable flag. Invalid-input errors stay non-retryable.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable && self.cause != StageErrorCause::InvalidInput;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("StageError"));
        map.insert("stage_name".to_string(), serde_json::json!(self.stage_name));
        map.insert("cause".to_string(), serde_json::json!(self.cause.as_str()));
        map.insert("retryable".to_string(), serde_json::json!(self.retryable));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

/// Error raised when a job id is unknown to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job not found: {job_id}")]
pub struct JobNotFoundError {
    /// The requested job id.
    pub job_id: JobId,
}

impl JobNotFoundError {
    /// Creates a new job-not-found error.
    #[must_use]
    pub const fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}

/// Error raised when cancelling a job that already finished.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job {job_id} is already {status}")]
pub struct JobAlreadyTerminalError {
    /// The job id.
    pub job_id: JobId,
    /// The terminal status the job holds.
    pub status: JobStatus,
}

impl JobAlreadyTerminalError {
    /// Creates a new already-terminal error.
    #[must_use]
    pub const fn new(job_id: JobId, status: JobStatus) -> Self {
        Self { job_id, status }
    }
}

/// Error raised when an idempotency key is held by an active job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Duplicate job: idempotency key '{idempotency_key}' is held by active job {existing_job_id}")]
pub struct DuplicateJobError {
    /// The conflicting key.
    pub idempotency_key: String,
    /// The job currently holding the key.
    pub existing_job_id: JobId,
}

impl DuplicateJobError {
    /// Creates a new duplicate-job error.
    #[must_use]
    pub fn new(idempotency_key: impl Into<String>, existing_job_id: JobId) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            existing_job_id,
        }
    }
}

/// Error raised when a job request fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid request field '{field}': {message}")]
pub struct InvalidRequestError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl InvalidRequestError {
    /// Creates a new invalid-request error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a record lifecycle transition is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job {job_id}: cannot transition from {from} to {to}")]
pub struct InvalidTransitionError {
    /// The job id.
    pub job_id: JobId,
    /// The status the record holds.
    pub from: JobStatus,
    /// The status that was requested.
    pub to: JobStatus,
}

/// Errors raised by job stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-WEIGHT-SUM").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

impl VidflowError {
    /// Converts to a dictionary representation suitable for API responses.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        if let Self::Stage(err) = self {
            return err.to_dict();
        }

        let kind = match self {
            Self::Stage(_) => "StageError",
            Self::JobNotFound(_) => "JobNotFoundError",
            Self::JobAlreadyTerminal(_) => "JobAlreadyTerminalError",
            Self::DuplicateJob(_) => "DuplicateJobError",
            Self::InvalidRequest(_) => "InvalidRequestError",
            Self::Validation(_) => "PipelineValidationError",
            Self::Store(_) => "StoreError",
            Self::InvalidTransition(_) => "InvalidTransitionError",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Self::Validation(err) = self {
            if let Some(code) = err.code() {
                map.insert("code".to_string(), serde_json::json!(code));
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cause_wire_names() {
        assert_eq!(StageErrorCause::UpstreamServiceError.to_string(), "upstream-service-error");
        assert_eq!(StageErrorCause::InvalidInput.to_string(), "invalid-input");
        assert_eq!(
            serde_json::to_string(&StageErrorCause::ResourceExhausted).unwrap(),
            r#""resource-exhausted""#
        );
    }

    #[test]
    fn test_default_retryability() {
        assert!(!StageError::upstream("render", "boom").retryable);
        assert!(!StageError::invalid_input("script", "missing key").retryable);
        assert!(StageError::timeout("images", "slow").retryable);
        assert!(StageError::resource_exhausted("narration", "quota").retryable);
    }

    #[test]
    fn test_invalid_input_never_retryable() {
        let err = StageError::invalid_input("script", "missing").with_retryable(true);
        assert!(!err.retryable);

        let err = StageError::upstream("render", "503").with_retryable(true);
        assert!(err.retryable);
    }

    #[test]
    fn test_stage_error_display_and_dict() {
        let err = StageError::invalid_input("stage2", "context key 'script' missing");
        assert_eq!(
            err.to_string(),
            "Stage 'stage2' failed (invalid-input): context key 'script' missing"
        );

        let dict = err.to_dict();
        assert_eq!(dict.get("cause").unwrap(), "invalid-input");
        assert_eq!(dict.get("retryable").unwrap(), false);
    }

    #[test]
    fn test_stage_error_serde() {
        let err = StageError::timeout("images", "deadline");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["cause"], "timeout");

        let back: StageError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_registry_error_dict() {
        let id = JobId::new();
        let err: VidflowError = JobAlreadyTerminalError::new(id, JobStatus::Completed).into();
        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "JobAlreadyTerminalError");
        assert!(dict.get("message").unwrap().as_str().unwrap().contains("completed"));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad")
            .with_error_info(ContractErrorInfo::new("PIPELINE-EMPTY", "empty"));
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));

        let dict = VidflowError::from(err).to_dict();
        assert_eq!(dict.get("code").unwrap(), "PIPELINE-EMPTY");
    }
}
