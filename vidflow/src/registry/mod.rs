//! The job registry.
//!
//! Tracks every known job, spawns one orchestrator task per submission and
//! routes cancellation requests. The job table is a `DashMap`, so lookups
//! and cancellations for different jobs never contend on a global lock.

use crate::cancellation::CancellationToken;
use crate::config::VidflowConfig;
use crate::core::{JobId, JobRecord, JobRequest, JobStatus, RequestLimits};
use crate::errors::{
    DuplicateJobError, JobAlreadyTerminalError, JobNotFoundError, StoreError, VidflowError,
};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::orchestrator::{JobOrchestrator, RecordSender, CANCELLED_BY_USER};
use crate::pipeline::PipelineCatalog;
use crate::status::StatusReporter;
use crate::store::{InMemoryJobStore, JobStore, JsonFileJobStore};
use crate::utils::is_older_than;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

/// Reason recorded for jobs found unfinished when records are restored.
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Reason recorded for jobs cancelled by [`JobRegistry::shutdown`].
pub const SHUTTING_DOWN: &str = "registry shutting down";

/// Default number of orchestrators allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

#[derive(Debug)]
struct JobSlot {
    record: Arc<RecordSender>,
    token: Arc<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobSlot {
    fn new(record: JobRecord) -> Self {
        let (sender, _) = watch::channel(Arc::new(record));
        Self {
            record: Arc::new(sender),
            token: Arc::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Arc<JobRecord> {
        Arc::clone(&*self.record.borrow())
    }
}

#[derive(Debug)]
struct RegistryInner {
    jobs: DashMap<JobId, JobSlot>,
    active_keys: Arc<DashMap<String, JobId>>,
    catalog: PipelineCatalog,
    limits: RequestLimits,
    gate: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    store: Arc<dyn JobStore>,
    events: Arc<dyn EventSink>,
}

/// Builder for [`JobRegistry`].
#[derive(Debug)]
pub struct JobRegistryBuilder {
    catalog: PipelineCatalog,
    limits: RequestLimits,
    max_concurrent_jobs: usize,
    store: Arc<dyn JobStore>,
    events: Arc<dyn EventSink>,
}

impl JobRegistryBuilder {
    /// Sets how many orchestrators may run at once. Values below 1 are
    /// raised to 1.
    #[must_use]
    pub fn max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }

    /// Sets the request bounds.
    #[must_use]
    pub const fn limits(mut self, limits: RequestLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the store committed records are saved to.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> JobRegistry {
        JobRegistry {
            inner: Arc::new(RegistryInner {
                jobs: DashMap::new(),
                active_keys: Arc::new(DashMap::new()),
                catalog: self.catalog,
                limits: self.limits,
                gate: Arc::new(Semaphore::new(self.max_concurrent_jobs)),
                max_concurrent_jobs: self.max_concurrent_jobs,
                store: self.store,
                events: self.events,
            }),
        }
    }
}

/// Tracks jobs and owns their orchestrator tasks.
///
/// Cloning is cheap; clones share the same job table.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    /// Starts building a registry over `catalog`.
    #[must_use]
    pub fn builder(catalog: PipelineCatalog) -> JobRegistryBuilder {
        JobRegistryBuilder {
            catalog,
            limits: RequestLimits::default(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            store: Arc::new(InMemoryJobStore::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a registry from configuration, using a JSON store when
    /// `store_dir` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn from_config(
        config: &VidflowConfig,
        catalog: PipelineCatalog,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, StoreError> {
        let mut builder = Self::builder(catalog)
            .max_concurrent_jobs(config.max_concurrent_jobs)
            .limits(config.request_limits())
            .events(events);
        if let Some(dir) = &config.store_dir {
            builder = builder.store(Arc::new(JsonFileJobStore::new(dir.clone())?));
        }
        Ok(builder.build())
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.inner.max_concurrent_jobs
    }

    /// Returns a status reporter reading from this registry.
    #[must_use]
    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(self.clone())
    }

    /// Accepts a request and starts its orchestrator.
    ///
    /// Returns as soon as the pending record exists; the job waits for an
    /// admission slot in the background.
    ///
    /// # Errors
    ///
    /// Returns [`VidflowError::InvalidRequest`] if validation fails,
    /// [`VidflowError::Validation`] if the job type has no pipeline and
    /// [`VidflowError::DuplicateJob`] if the idempotency key belongs to an
    /// active job.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, VidflowError> {
        let request = request.with_defaults(&self.inner.limits);
        request.validate(&self.inner.limits)?;
        let pipeline = self.inner.catalog.pipeline_for(request.job_type)?;

        let job_id = JobId::new();
        let job_type = request.job_type;
        let fingerprint = request.fingerprint();
        let idempotency_key = request.idempotency_key.clone();
        let slot = JobSlot::new(JobRecord::new(job_id, request));
        let pending = slot.snapshot();
        let sender = Arc::clone(&slot.record);
        let token = Arc::clone(&slot.token);

        // The slot goes into the table while the key entry is held, so a
        // racing submit always finds the key's holder.
        match &idempotency_key {
            Some(key) => match self.inner.active_keys.entry(key.clone()) {
                Entry::Occupied(mut existing) => {
                    let holder = *existing.get();
                    let holder_active = self
                        .inner
                        .jobs
                        .get(&holder)
                        .is_some_and(|held| !held.snapshot().is_terminal());
                    if holder_active {
                        return Err(DuplicateJobError::new(key.clone(), holder).into());
                    }
                    self.inner.jobs.insert(job_id, slot);
                    existing.insert(job_id);
                }
                Entry::Vacant(vacant) => {
                    self.inner.jobs.insert(job_id, slot);
                    vacant.insert(job_id);
                }
            },
            None => {
                self.inner.jobs.insert(job_id, slot);
            }
        }

        if let Err(err) = self.inner.store.save(&pending).await {
            warn!(%job_id, error = %err, "Failed to persist job record");
        }
        info!(%job_id, %job_type, %fingerprint, "Job submitted");
        self.inner
            .events
            .emit(
                events::JOB_SUBMITTED,
                Some(json!({
                    "job_id": job_id,
                    "job_type": job_type,
                    "fingerprint": fingerprint,
                })),
            )
            .await;

        let orchestrator = JobOrchestrator::new(sender, pipeline, Arc::clone(&token))
            .with_store(Arc::clone(&self.inner.store))
            .with_events(Arc::clone(&self.inner.events));
        let gate = Arc::clone(&self.inner.gate);
        let active_keys = Arc::clone(&self.inner.active_keys);

        let task = tokio::spawn(
            async move {
                let permit = tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    permit = gate.acquire_owned() => permit.ok(),
                };

                match permit {
                    Some(_permit) => {
                        orchestrator.run().await;
                    }
                    None => {
                        orchestrator.cancel_before_start().await;
                    }
                }

                if let Some(key) = idempotency_key {
                    active_keys.remove_if(&key, |_, owner| *owner == job_id);
                }
            }
            .instrument(info_span!("job", %job_id, %job_type)),
        );

        if let Some(slot) = self.inner.jobs.get(&job_id) {
            *slot.task.lock() = Some(task);
        }
        Ok(job_id)
    }

    /// Requests cooperative cancellation. Returns immediately; the job stops
    /// at its next stage boundary.
    ///
    /// Concurrent requests for the same job all succeed.
    ///
    /// # Errors
    ///
    /// Returns [`VidflowError::JobNotFound`] for unknown ids and
    /// [`VidflowError::JobAlreadyTerminal`] once the job has finished.
    pub fn request_cancel(&self, job_id: JobId) -> Result<(), VidflowError> {
        let slot = self
            .inner
            .jobs
            .get(&job_id)
            .ok_or(JobNotFoundError::new(job_id))?;

        let record = slot.snapshot();
        if record.is_terminal() {
            return Err(JobAlreadyTerminalError::new(job_id, record.status).into());
        }

        if slot.token.cancel(CANCELLED_BY_USER) {
            info!(%job_id, status = %record.status, "Cancellation requested");
            self.inner.events.try_emit(
                events::JOB_CANCEL_REQUESTED,
                Some(json!({"job_id": job_id, "status": record.status})),
            );
        }
        Ok(())
    }

    /// Returns the latest committed record.
    ///
    /// # Errors
    ///
    /// Returns [`JobNotFoundError`] for unknown or evicted ids.
    pub fn get(&self, job_id: JobId) -> Result<Arc<JobRecord>, JobNotFoundError> {
        self.inner
            .jobs
            .get(&job_id)
            .map(|slot| slot.snapshot())
            .ok_or(JobNotFoundError::new(job_id))
    }

    /// Returns a receiver yielding every committed record of the job.
    ///
    /// # Errors
    ///
    /// Returns [`JobNotFoundError`] for unknown or evicted ids.
    pub fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<watch::Receiver<Arc<JobRecord>>, JobNotFoundError> {
        self.inner
            .jobs
            .get(&job_id)
            .map(|slot| slot.record.subscribe())
            .ok_or(JobNotFoundError::new(job_id))
    }

    /// Waits until the job holds a terminal record and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`JobNotFoundError`] for unknown or evicted ids.
    pub async fn wait_for(&self, job_id: JobId) -> Result<Arc<JobRecord>, JobNotFoundError> {
        let mut rx = self.subscribe(job_id)?;
        if let Ok(record) = rx
            .wait_for(|record| record.is_terminal())
            .await
            .map(|record| Arc::clone(&*record))
        {
            return Ok(record);
        }
        let record = Arc::clone(&*rx.borrow());
        Ok(record)
    }

    /// Snapshots every known job, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<JobRecord>> {
        let mut records: Vec<Arc<JobRecord>> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        records.sort_by_key(|record| record.created_at);
        records
    }

    /// Returns the number of jobs that are pending or processing.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .iter()
            .filter(|entry| !entry.value().snapshot().is_terminal())
            .count()
    }

    /// Returns the number of known jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Returns true if no jobs are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Drops terminal records whose `completed_at` lies more than `age` in
    /// the past, from the table and the store. Active records are never
    /// evicted.
    pub async fn evict_terminal_older_than(&self, age: Duration) -> Vec<JobId> {
        let mut evicted = Vec::new();
        self.inner.jobs.retain(|job_id, slot| {
            let record = slot.snapshot();
            let expired = record.is_terminal()
                && record
                    .completed_at
                    .is_some_and(|completed| is_older_than(&completed, age));
            if expired {
                evicted.push(*job_id);
            }
            !expired
        });

        for job_id in &evicted {
            if let Err(err) = self.inner.store.delete(*job_id).await {
                warn!(%job_id, error = %err, "Failed to delete evicted job record");
            }
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted terminal jobs");
        }
        evicted
    }

    /// Loads stored records into the table.
    ///
    /// Records found pending or processing belonged to a previous process;
    /// they are closed as cancelled with reason `interrupted by restart`.
    /// Ids already in the table are skipped. Returns the number of records
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list its records.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let mut restored = 0;
        for record in self.inner.store.load_all().await? {
            if self.inner.jobs.contains_key(&record.id) {
                continue;
            }

            let record = if record.is_terminal() {
                record
            } else {
                let closed = close_interrupted(&record);
                if let Err(err) = self.inner.store.save(&closed).await {
                    warn!(job_id = %closed.id, error = %err, "Failed to persist job record");
                }
                info!(job_id = %closed.id, "Closed job interrupted by restart");
                closed
            };

            self.inner.jobs.insert(record.id, JobSlot::new(record));
            restored += 1;
        }
        Ok(restored)
    }

    /// Cancels every active job and waits for all orchestrator tasks to end.
    pub async fn shutdown(&self) {
        let mut tasks = Vec::new();
        for entry in self.inner.jobs.iter() {
            let slot = entry.value();
            if !slot.snapshot().is_terminal() {
                slot.token.cancel(SHUTTING_DOWN);
            }
            if let Some(task) = slot.task.lock().take() {
                tasks.push((*entry.key(), task));
            }
        }

        info!(tasks = tasks.len(), "Shutting down job registry");
        for (job_id, task) in tasks {
            if let Err(err) = task.await {
                warn!(%job_id, error = %err, "Orchestrator task ended abnormally");
            }
        }
    }
}

fn close_interrupted(record: &JobRecord) -> JobRecord {
    let closed = match record.status {
        JobStatus::Processing => record.cancel(INTERRUPTED_BY_RESTART),
        _ => record
            .start(None)
            .and_then(|started| started.cancel(INTERRUPTED_BY_RESTART)),
    };
    closed.unwrap_or_else(|err| {
        warn!(job_id = %record.id, error = %err, "Could not close interrupted job");
        record.clone()
    })
}
