//! Mock stage executors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::core::StageOutput;
use crate::errors::{StageError, StageErrorCause};
use crate::stages::{StageContext, StageExecutor};

/// Succeeds with a fixed set of writes.
#[derive(Debug, Default)]
pub struct StaticExecutor {
    output: StageOutput,
    calls: AtomicUsize,
}

impl StaticExecutor {
    /// Creates an executor returning `output` on every call.
    #[must_use]
    pub fn new(output: StageOutput) -> Self {
        Self {
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates an executor writing a single key.
    #[must_use]
    pub fn writing(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(StageOutput::value(key, value))
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for StaticExecutor {
    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Always fails with the configured cause.
#[derive(Debug)]
pub struct FailingExecutor {
    cause: StageErrorCause,
    message: String,
    calls: AtomicUsize,
}

impl FailingExecutor {
    /// Creates a failing executor.
    #[must_use]
    pub fn new(cause: StageErrorCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ctx.error(self.cause, self.message.clone()))
    }
}

/// Fails with a retryable `resource-exhausted` error a fixed number of
/// times, then succeeds.
#[derive(Debug)]
pub struct FlakyExecutor {
    failures: usize,
    key: String,
    value: serde_json::Value,
    calls: AtomicUsize,
}

impl FlakyExecutor {
    /// Creates an executor failing `failures` times before writing `key`.
    #[must_use]
    pub fn new(failures: usize, key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            failures,
            key: key.into(),
            value,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for FlakyExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StageError::resource_exhausted(ctx.stage_name(), "quota exceeded"));
        }
        Ok(StageOutput::value(self.key.clone(), self.value.clone()))
    }
}

/// Records the context keys it was shown and writes one key.
#[derive(Debug)]
pub struct RecordingExecutor {
    key: String,
    seen: Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    /// Creates a recording executor writing `key = true`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the context keys seen on each call.
    #[must_use]
    pub fn seen_keys(&self) -> Vec<Vec<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        let keys = ctx.context().keys().into_iter().map(str::to_string).collect();
        self.seen.lock().push(keys);
        Ok(StageOutput::value(self.key.clone(), serde_json::Value::Bool(true)))
    }
}

/// Blocks inside `execute` until released, so tests can act while a stage
/// is in flight.
#[derive(Debug)]
pub struct GatedExecutor {
    outcome: Result<StageOutput, (StageErrorCause, String)>,
    entered: Semaphore,
    release: Semaphore,
}

impl GatedExecutor {
    fn with_outcome(outcome: Result<StageOutput, (StageErrorCause, String)>) -> Self {
        Self {
            outcome,
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        }
    }

    /// Creates a gate that writes `key = true` once released.
    #[must_use]
    pub fn succeeding(key: impl Into<String>) -> Self {
        Self::with_outcome(Ok(StageOutput::value(key, serde_json::Value::Bool(true))))
    }

    /// Creates a gate that fails with `cause` once released.
    #[must_use]
    pub fn failing(cause: StageErrorCause, message: impl Into<String>) -> Self {
        Self::with_outcome(Err((cause, message.into())))
    }

    /// Waits until a call has entered `execute`.
    pub async fn entered(&self) {
        if let Ok(permit) = self.entered.acquire().await {
            permit.forget();
        }
    }

    /// Lets one blocked call finish.
    pub fn release(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait]
impl StageExecutor for GatedExecutor {
    async fn execute(&self, ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        self.entered.add_permits(1);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        match &self.outcome {
            Ok(output) => Ok(output.clone()),
            Err((cause, message)) => Err(ctx.error(*cause, message.clone())),
        }
    }
}

/// Sleeps before succeeding without writes.
#[derive(Debug)]
pub struct SlowExecutor {
    delay: Duration,
}

impl SlowExecutor {
    /// Creates an executor sleeping for `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl StageExecutor for SlowExecutor {
    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(StageOutput::new())
    }
}

/// Panics on every call.
#[derive(Debug, Default)]
pub struct PanickingExecutor;

#[async_trait]
impl StageExecutor for PanickingExecutor {
    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        panic!("renderer crashed");
    }
}

/// Writes to a key it does not own.
#[derive(Debug)]
pub struct TrespassingExecutor {
    key: String,
}

impl TrespassingExecutor {
    /// Creates an executor that overwrites `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl StageExecutor for TrespassingExecutor {
    async fn execute(&self, _ctx: StageContext<'_>) -> Result<StageOutput, StageError> {
        Ok(StageOutput::value(self.key.clone(), serde_json::json!("overwritten")))
    }
}
