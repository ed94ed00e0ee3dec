//! Stage executor trait and implementations.
//!
//! A stage executor is the black-box unit of work behind one pipeline stage
//! (content analysis, script generation, image synthesis, narration,
//! rendering). The orchestrator hands it the accumulated context and merges
//! whatever it returns.

mod retry;
mod timeout;

pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryingExecutor};
pub use timeout::TimeoutExecutor;

use crate::core::{JobContext, JobId, StageOutput};
use crate::errors::{StageError, StageErrorCause};
use async_trait::async_trait;
use std::fmt::Debug;

/// Everything a stage executor receives for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    job_id: JobId,
    stage_name: &'a str,
    context: &'a JobContext,
}

impl<'a> StageContext<'a> {
    /// Creates a new stage context.
    #[must_use]
    pub const fn new(job_id: JobId, stage_name: &'a str, context: &'a JobContext) -> Self {
        Self {
            job_id,
            stage_name,
            context,
        }
    }

    /// The job being driven.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The pipeline's name for this stage.
    #[must_use]
    pub const fn stage_name(&self) -> &'a str {
        self.stage_name
    }

    /// The accumulated job context.
    #[must_use]
    pub const fn context(&self) -> &'a JobContext {
        self.context
    }

    /// Gets a context value the stage cannot run without.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error naming this stage if the key is absent.
    pub fn require(&self, key: &str) -> Result<&'a serde_json::Value, StageError> {
        self.context.require(self.stage_name, key)
    }

    /// Builds an error attributed to this stage.
    #[must_use]
    pub fn error(&self, cause: StageErrorCause, message: impl Into<String>) -> StageError {
        StageError::new(self.stage_name, cause, message)
    }
}

/// Trait for pipeline stage executors.
///
/// Implementations must treat the context as read-only and return only the
/// keys they own. Any retry or timeout policy lives inside the executor; see
/// [`RetryingExecutor`] and [`TimeoutExecutor`].
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Executes the stage.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] describing why the stage could not produce
    /// its output.
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError>;
}

/// A simple function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(StageContext<'_>) -> Result<StageOutput, StageError> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(StageContext<'_>) -> Result<StageOutput, StageError> + Send + Sync,
{
    /// Creates a new function-based executor.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnExecutor<F>
where
    F: Fn(StageContext<'_>) -> Result<StageOutput, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor")
            .field("label", &self.label)
            .finish()
    }
}

#[async_trait]
impl<F> StageExecutor for FnExecutor<F>
where
    F: Fn(StageContext<'_>) -> Result<StageOutput, StageError> + Send + Sync,
{
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        (self.func)(ctx)
    }
}

/// An executor that succeeds without writing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExecutor;

#[async_trait]
impl StageExecutor for NoOpExecutor {
    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        Ok(StageOutput::new())
    }
}
