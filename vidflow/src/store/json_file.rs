//! One JSON file per job record.

use super::JobStore;
use crate::core::{JobId, JobRecord};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A job store writing `<id>.json` files under a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonFileJobStore {
    root: PathBuf,
}

impl JsonFileJobStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is empty.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(StoreError::Backend("store directory is empty".to_string()));
        }
        Ok(Self { root })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, job_id: JobId) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }

    async fn read_record(path: &Path) -> Result<Option<JobRecord>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.record_path(record.id);
        let temp = target.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&temp, &target).await?;
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Self::read_record(&self.record_path(job_id)).await
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping unreadable job record");
                }
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete(&self, job_id: JobId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.record_path(job_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
