//! # Vidflow
//!
//! Orchestration core for staged video-generation jobs.
//!
//! A submitted request becomes a [`core::JobRecord`] that moves through a
//! fixed pipeline of weighted stages (analysis, script, images, narration,
//! rendering), accumulating outputs in a shared context and reporting
//! progress as it goes:
//!
//! - **Pipelines**: validated, weighted stage lists selected per job type
//! - **Orchestration**: one single-writer task per job with cooperative
//!   cancellation at stage boundaries
//! - **Registry**: concurrent job table with an admission gate, idempotency
//!   keys, eviction and restore from a durable store
//! - **Status**: snapshot reads and push subscriptions of committed records
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vidflow::prelude::*;
//!
//! let catalog = PipelineCatalog::new(&executors)?;
//! let registry = JobRegistry::builder(catalog).max_concurrent_jobs(2).build();
//!
//! let job_id = registry
//!     .submit(JobRequest::new(
//!         JobType::VideoGeneration,
//!         ["paper-42"],
//!         GenerationOptions::new("Black holes").with_duration_secs(180),
//!     ))
//!     .await?;
//!
//! let status = registry.status_reporter().get_status(job_id)?;
//! println!("{}", status.message);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod status;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{LoggingConfig, VidflowConfig};
    pub use crate::core::{
        GenerationOptions, JobContext, JobId, JobRecord, JobRequest, JobStatus, JobType,
        StageOutput,
    };
    pub use crate::errors::{
        ContractErrorInfo, DuplicateJobError, InvalidRequestError, JobAlreadyTerminalError,
        JobNotFoundError, PipelineValidationError, StageError, StageErrorCause, VidflowError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::JobOrchestrator;
    pub use crate::pipeline::{
        PipelineBuilder, PipelineCatalog, StageDefinition, StageExecutors, StagePipeline,
        StageSlot,
    };
    pub use crate::registry::JobRegistry;
    pub use crate::stages::{
        FnExecutor, RetryConfig, RetryingExecutor, StageContext, StageExecutor, TimeoutExecutor,
    };
    pub use crate::status::{JobStatusView, StatusReporter};
    pub use crate::store::{InMemoryJobStore, JobStore, JsonFileJobStore};
    pub use crate::utils::{iso_timestamp, Timestamp};
}
