//! Testing utilities for job pipelines.
//!
//! This module provides:
//! - Mock stage executors (static, failing, flaky, recording, gated, slow,
//!   panicking)
//! - Request, pipeline and registry fixtures

mod fixtures;
mod mocks;

pub use fixtures::{registry_with, sample_request, static_executors, three_stage_pipeline};
pub use mocks::{
    FailingExecutor, FlakyExecutor, GatedExecutor, PanickingExecutor, RecordingExecutor,
    SlowExecutor, StaticExecutor, TrespassingExecutor,
};
