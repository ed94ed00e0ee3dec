//! The per-job driver.
//!
//! A [`JobOrchestrator`] is the only writer of its job's record. It runs the
//! pipeline's stages in order, checks the cancellation token at every stage
//! boundary and publishes each committed snapshot through a `watch` channel.

#[cfg(test)]
mod integration_tests;

use crate::cancellation::CancellationToken;
use crate::core::{JobContext, JobId, JobRecord};
use crate::errors::{InvalidTransitionError, StageError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::pipeline::{StageDefinition, StagePipeline};
use crate::stages::StageContext;
use crate::store::JobStore;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Reason recorded when a caller cancels a job.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Channel carrying a job's latest committed record.
pub type RecordSender = watch::Sender<Arc<JobRecord>>;

/// Publishes committed snapshots to readers and the store.
#[derive(Debug, Clone)]
pub(crate) struct RecordPublisher {
    sender: Arc<RecordSender>,
    store: Option<Arc<dyn JobStore>>,
}

impl RecordPublisher {
    pub(crate) fn new(sender: Arc<RecordSender>, store: Option<Arc<dyn JobStore>>) -> Self {
        Self { sender, store }
    }

    pub(crate) fn current(&self) -> Arc<JobRecord> {
        Arc::clone(&*self.sender.borrow())
    }

    /// Persists `record`, then swaps it in as the latest snapshot.
    ///
    /// Readers never see a snapshot whose save is still in flight, so a
    /// terminal record evicted right after it is published stays deleted.
    pub(crate) async fn commit(&self, record: JobRecord) -> Arc<JobRecord> {
        let record = Arc::new(record);
        if let Some(store) = &self.store {
            if let Err(err) = store.save(&record).await {
                warn!(job_id = %record.id, error = %err, "Failed to persist job record");
            }
        }
        self.sender.send_replace(Arc::clone(&record));
        record
    }
}

/// Drives one job through its pipeline.
#[derive(Debug)]
pub struct JobOrchestrator {
    publisher: RecordPublisher,
    pipeline: Arc<StagePipeline>,
    token: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
}

impl JobOrchestrator {
    /// Creates an orchestrator for the record held by `sender`.
    #[must_use]
    pub fn new(
        sender: Arc<RecordSender>,
        pipeline: Arc<StagePipeline>,
        token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            publisher: RecordPublisher::new(sender, None),
            pipeline,
            token,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Persists every committed snapshot to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.publisher.store = Some(store);
        self
    }

    /// Reports lifecycle events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn job_id(&self) -> JobId {
        self.publisher.current().id
    }

    /// Runs the pipeline to a terminal record.
    ///
    /// A record that is already terminal is returned untouched.
    pub async fn run(self) -> Arc<JobRecord> {
        let job_id = self.job_id();
        match self.drive().await {
            Ok(record) => record,
            Err(err) => {
                error!(%job_id, error = %err, "Orchestrator aborted on an invalid transition");
                self.publisher.current()
            }
        }
    }

    /// Closes a job that was cancelled before it was admitted.
    ///
    /// The record passes through `processing` so every cancelled job follows
    /// the same lifecycle; progress stays at 0.
    pub async fn cancel_before_start(self) -> Arc<JobRecord> {
        let job_id = self.job_id();
        match self.close_unstarted().await {
            Ok(record) => record,
            Err(err) => {
                error!(%job_id, error = %err, "Orchestrator aborted on an invalid transition");
                self.publisher.current()
            }
        }
    }

    async fn close_unstarted(&self) -> Result<Arc<JobRecord>, InvalidTransitionError> {
        let current = self.publisher.current();
        if current.is_terminal() {
            return Ok(current);
        }
        let started = self
            .publisher
            .commit(current.start(self.pipeline.first_stage())?)
            .await;
        self.finish_cancelled(&started).await
    }

    async fn drive(&self) -> Result<Arc<JobRecord>, InvalidTransitionError> {
        let pending = self.publisher.current();
        if pending.is_terminal() {
            return Ok(pending);
        }

        let mut record = self
            .publisher
            .commit(pending.start(self.pipeline.first_stage())?)
            .await;
        info!(job_id = %record.id, stages = self.pipeline.stage_count(), "Job started");
        self.events
            .emit(
                events::JOB_STARTED,
                Some(json!({"job_id": record.id, "job_type": record.job_type})),
            )
            .await;

        let stages = self.pipeline.stages();
        for (index, stage) in stages.iter().enumerate() {
            if self.token.is_cancelled() {
                return self.finish_cancelled(&record).await;
            }

            self.events
                .emit(
                    events::STAGE_STARTED,
                    Some(json!({"job_id": record.id, "stage": stage.name})),
                )
                .await;
            debug!(job_id = %record.id, stage = %stage.name, "Stage started");

            let merged = match self.execute_stage(&record, stage).await {
                Ok(context) => context,
                Err(err) => return self.finish_failed(&record, err).await,
            };

            let next_stage = stages.get(index + 1).map(|s| s.name.as_str());
            let mut next = record.advance(stage.weight, merged, next_stage)?;
            if next_stage.is_none() {
                next = next.complete()?;
            }
            record = self.publisher.commit(next).await;

            debug!(
                job_id = %record.id,
                stage = %stage.name,
                progress = record.progress,
                "Stage completed"
            );
            self.events
                .emit(
                    events::STAGE_COMPLETED,
                    Some(json!({
                        "job_id": record.id,
                        "stage": stage.name,
                        "progress": record.progress,
                    })),
                )
                .await;
        }

        if !record.is_terminal() {
            record = self.publisher.commit(record.complete()?).await;
        }
        info!(job_id = %record.id, "Job completed");
        self.events
            .emit(events::JOB_COMPLETED, Some(json!({"job_id": record.id})))
            .await;
        Ok(record)
    }

    /// Invokes one executor and folds its writes into a new context.
    async fn execute_stage(
        &self,
        record: &JobRecord,
        stage: &StageDefinition,
    ) -> Result<JobContext, StageError> {
        let ctx = StageContext::new(record.id, &stage.name, &record.context);
        let outcome = AssertUnwindSafe(stage.executor.execute(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(StageError::upstream(
                    stage.name.as_str(),
                    format!("stage panicked: {}", panic_message(panic.as_ref())),
                ))
            });

        let output = outcome.map_err(|mut err| {
            if err.stage_name != stage.name {
                err.stage_name.clone_from(&stage.name);
            }
            err
        })?;

        record
            .context
            .merged(&stage.name, output)
            .map_err(|err| StageError::invalid_input(stage.name.as_str(), err.to_string()))
    }

    async fn finish_failed(
        &self,
        record: &JobRecord,
        err: StageError,
    ) -> Result<Arc<JobRecord>, InvalidTransitionError> {
        warn!(
            job_id = %record.id,
            stage = %err.stage_name,
            cause = err.cause.as_str(),
            retryable = err.retryable,
            progress = record.progress,
            "Job failed: {}",
            err.message
        );
        self.events
            .emit(events::STAGE_FAILED, Some(failure_data(record.id, &err)))
            .await;
        let failed = self.publisher.commit(record.fail(err)?).await;
        if let Some(err) = &failed.error {
            self.events
                .emit(events::JOB_FAILED, Some(failure_data(failed.id, err)))
                .await;
        }
        Ok(failed)
    }

    async fn finish_cancelled(
        &self,
        record: &JobRecord,
    ) -> Result<Arc<JobRecord>, InvalidTransitionError> {
        let reason = self
            .token
            .reason()
            .unwrap_or_else(|| CANCELLED_BY_USER.to_string());
        let cancelled = self.publisher.commit(record.cancel(reason)?).await;
        info!(
            job_id = %cancelled.id,
            progress = cancelled.progress,
            reason = cancelled.cancel_reason.as_deref().unwrap_or_default(),
            "Job cancelled"
        );
        self.events
            .emit(
                events::JOB_CANCELLED,
                Some(json!({
                    "job_id": cancelled.id,
                    "progress": cancelled.progress,
                    "reason": cancelled.cancel_reason,
                })),
            )
            .await;
        Ok(cancelled)
    }
}

fn failure_data(job_id: JobId, err: &StageError) -> serde_json::Value {
    json!({
        "job_id": job_id,
        "stage": err.stage_name,
        "cause": err.cause,
        "retryable": err.retryable,
        "message": err.message,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
