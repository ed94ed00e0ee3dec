//! Durable copies of committed job records.
//!
//! Every committed snapshot is saved before readers can see it. Save
//! failures are logged and never change a job's outcome.

mod json_file;
mod memory;

pub use json_file::JsonFileJobStore;
pub use memory::InMemoryJobStore;

use crate::core::{JobId, JobRecord};
use crate::errors::StoreError;
use async_trait::async_trait;

/// Persistence backend for job records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Saves (inserts or replaces) a record.
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Loads one record, `None` if it was never saved.
    async fn load(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Loads every saved record.
    async fn load_all(&self) -> Result<Vec<JobRecord>, StoreError>;

    /// Deletes a record. Deleting an unknown id is not an error.
    async fn delete(&self, job_id: JobId) -> Result<(), StoreError>;
}
