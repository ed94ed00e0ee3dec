//! Stage-internal retry with configurable backoff and jitter strategies.
//!
//! The orchestrator never retries; a stage that wants to ride out transient
//! upstream failures wraps its executor in a [`RetryingExecutor`].

use super::{StageContext, StageExecutor};
use crate::core::StageOutput;
use crate::errors::StageError;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Calculates the delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let attempt = u32::try_from(attempt).unwrap_or(u32::MAX);

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(attempt)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Wraps an executor and retries its retryable failures.
///
/// Non-retryable errors pass through immediately. When the attempt budget
/// is spent the last error is returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    inner: Arc<dyn StageExecutor>,
    config: RetryConfig,
}

impl RetryingExecutor {
    /// Creates a new retrying executor.
    #[must_use]
    pub fn new(inner: Arc<dyn StageExecutor>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the retry configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl StageExecutor for RetryingExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.inner.execute(ctx).await {
                Ok(output) => return Ok(output),
                Err(err) if err.retryable && attempt + 1 < max_attempts => {
                    let delay = self.config.delay_for(attempt);
                    attempt += 1;
                    debug!(
                        job_id = %ctx.job_id(),
                        stage = ctx.stage_name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying stage after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.retryable {
                        warn!(
                            job_id = %ctx.job_id(),
                            stage = ctx.stage_name(),
                            attempts = attempt + 1,
                            "Retry budget exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobContext, JobId};
    use crate::errors::StageErrorCause;
    use crate::testing::{FailingExecutor, FlakyExecutor};

    fn fast() -> RetryConfig {
        RetryConfig::new()
            .with_base_delay_ms(1)
            .with_max_delay_ms(2)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_backoff_delays() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(1000)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
        assert_eq!(config.delay_for(10), Duration::from_millis(1000));

        let linear = config.clone().with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let constant = config.with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let config = RetryConfig::new().with_base_delay_ms(50).with_max_delay_ms(50);
        for attempt in 0..20 {
            assert!(config.delay_for(attempt) <= Duration::from_millis(50));
        }
    }

    #[tokio::test]
    async fn test_recovers_from_transient_failures() {
        let flaky = Arc::new(FlakyExecutor::new(2, "images", serde_json::json!(["a.png"])));
        let executor = RetryingExecutor::new(flaky.clone(), fast().with_max_attempts(3));
        let context = JobContext::new();

        let output = executor
            .execute(StageContext::new(JobId::new(), "images", &context))
            .await
            .unwrap();

        assert_eq!(output.get("images"), Some(&serde_json::json!(["a.png"])));
        assert_eq!(flaky.call_count(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted_returns_last_error() {
        let flaky = Arc::new(FlakyExecutor::new(5, "images", serde_json::json!([])));
        let executor = RetryingExecutor::new(flaky.clone(), fast().with_max_attempts(2));
        let context = JobContext::new();

        let err = executor
            .execute(StageContext::new(JobId::new(), "images", &context))
            .await
            .unwrap_err();

        assert!(err.retryable);
        assert_eq!(err.cause, StageErrorCause::ResourceExhausted);
        assert_eq!(flaky.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_not_retried() {
        let failing = Arc::new(FailingExecutor::new(StageErrorCause::InvalidInput, "no script"));
        let executor = RetryingExecutor::new(failing.clone(), fast().with_max_attempts(5));
        let context = JobContext::new();

        let err = executor
            .execute(StageContext::new(JobId::new(), "render", &context))
            .await
            .unwrap_err();

        assert_eq!(err.cause, StageErrorCause::InvalidInput);
        assert_eq!(failing.call_count(), 1);
    }
}
