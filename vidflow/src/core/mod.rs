//! Core domain model types for vidflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Job identifiers and lifecycle status
//! - The accumulating job context and stage outputs
//! - Job requests and the job record

mod context;
mod output;
mod record;
mod request;
mod status;

pub use context::{ContextEntry, ContextOwnershipError, JobContext, REQUEST_OWNER};
pub use output::StageOutput;
pub use record::{JobRecord, MAX_PROGRESS};
pub use request::{GenerationOptions, JobRequest, JobType, RequestLimits};
pub use status::{JobId, JobStatus};
