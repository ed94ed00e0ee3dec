//! In-memory job store.

use super::JobStore;
use crate::core::{JobId, JobRecord};
use crate::errors::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A job store backed by a `HashMap`, lost on process exit.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.read().get(&job_id).cloned())
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete(&self, job_id: JobId) -> Result<(), StoreError> {
        self.records.write().remove(&job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_request;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemoryJobStore::new();
        let record = JobRecord::new(JobId::new(), sample_request());

        store.save(&record).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(record.id).await.unwrap(), Some(record.clone()));

        let started = record.start(Some("analyze")).unwrap();
        store.save(&started).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load_all().await.unwrap(), vec![started]);

        store.delete(record.id).await.unwrap();
        store.delete(record.id).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.load(record.id).await.unwrap(), None);
    }
}
