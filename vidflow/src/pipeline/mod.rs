//! Pipeline definition and validation.
//!
//! This module provides:
//! - Stage definitions and validated pipelines
//! - Pipeline builder with validation
//! - The per-job-type pipeline catalog

mod builder;
mod catalog;
mod spec;

pub use builder::{PipelineBuilder, TOTAL_WEIGHT};
pub use catalog::{layout, PipelineCatalog, StageExecutors, StageSlot};
pub use spec::{StageDefinition, StagePipeline};
