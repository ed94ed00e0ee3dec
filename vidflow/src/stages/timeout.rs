//! Per-stage deadlines.

use super::{StageContext, StageExecutor};
use crate::core::StageOutput;
use crate::errors::StageError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Bounds an executor's call and surfaces a `timeout` [`StageError`] when
/// the deadline passes.
///
/// Compose inside a [`super::RetryingExecutor`] to retry timed-out calls.
#[derive(Debug, Clone)]
pub struct TimeoutExecutor {
    inner: Arc<dyn StageExecutor>,
    limit: Duration,
    retryable: bool,
}

impl TimeoutExecutor {
    /// Creates a new timeout wrapper. Timeouts are reported as retryable.
    #[must_use]
    pub fn new(inner: Arc<dyn StageExecutor>, limit: Duration) -> Self {
        Self {
            inner,
            limit,
            retryable: true,
        }
    }

    /// Sets whether a timeout is reported as retryable.
    #[must_use]
    pub const fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Returns the deadline.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

#[async_trait]
impl StageExecutor for TimeoutExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        match tokio::time::timeout(self.limit, self.inner.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(StageError::timeout(
                ctx.stage_name(),
                format!("stage exceeded its {:.3}s limit", self.limit.as_secs_f64()),
            )
            .with_retryable(self.retryable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobContext, JobId};
    use crate::errors::StageErrorCause;
    use crate::stages::NoOpExecutor;
    use crate::testing::SlowExecutor;

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let executor = TimeoutExecutor::new(Arc::new(NoOpExecutor), Duration::from_secs(1));
        let context = JobContext::new();
        assert!(executor
            .execute(StageContext::new(JobId::new(), "analyze", &context))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let slow = Arc::new(SlowExecutor::new(Duration::from_secs(5)));
        let executor = TimeoutExecutor::new(slow, Duration::from_millis(20)).with_retryable(false);
        let context = JobContext::new();

        let err = executor
            .execute(StageContext::new(JobId::new(), "render", &context))
            .await
            .unwrap_err();

        assert_eq!(err.cause, StageErrorCause::Timeout);
        assert_eq!(err.stage_name, "render");
        assert!(!err.retryable);
    }
}
