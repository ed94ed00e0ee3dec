//! Read-only job status projection.

use crate::core::{JobId, JobRecord, JobStatus};
use crate::errors::{JobNotFoundError, StageError};
use crate::registry::JobRegistry;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// What a polling client sees for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// The job.
    pub job_id: JobId,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Percentage complete.
    pub progress: u8,
    /// Stage in progress, or the failing stage.
    pub current_stage: Option<String>,
    /// Failure detail, only when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    /// Human-readable summary, e.g. `Status: processing (30%)`.
    pub message: String,
    /// When the record last changed.
    pub updated_at: Timestamp,
}

impl From<&JobRecord> for JobStatusView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            progress: record.progress,
            current_stage: record.current_stage.clone(),
            error: record.error.clone(),
            message: format!("Status: {} ({}%)", record.status, record.progress),
            updated_at: record.updated_at,
        }
    }
}

/// Serves status snapshots from a [`JobRegistry`].
#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: JobRegistry,
}

impl StatusReporter {
    /// Creates a reporter over `registry`.
    #[must_use]
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry }
    }

    /// Returns the latest committed status.
    ///
    /// # Errors
    ///
    /// Returns [`JobNotFoundError`] for unknown or evicted ids.
    pub fn get_status(&self, job_id: JobId) -> Result<JobStatusView, JobNotFoundError> {
        self.registry
            .get(job_id)
            .map(|record| JobStatusView::from(record.as_ref()))
    }

    /// Returns a receiver that yields every committed record, for push
    /// streaming.
    ///
    /// # Errors
    ///
    /// Returns [`JobNotFoundError`] for unknown or evicted ids.
    pub fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<watch::Receiver<Arc<JobRecord>>, JobNotFoundError> {
        self.registry.subscribe(job_id)
    }
}
