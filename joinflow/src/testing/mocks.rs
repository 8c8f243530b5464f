//! Mock transforms for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::TransformError;
use crate::stages::{StageContext, StageId, StageInput, Transform};

fn overflow(ctx: &StageContext) -> TransformError {
    TransformError::new(format!("{} overflowed", ctx.stage_id()))
}

/// Doubles its seed; a dependent stage doubles the sum of its upstreams.
///
/// Refuses zero with `"<stage id, lowercased> cannot be 0"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleTransform;

#[async_trait]
impl Transform<i64> for DoubleTransform {
    async fn apply(&self, ctx: &StageContext, input: StageInput<i64>) -> Result<i64, TransformError> {
        let value = match input {
            StageInput::Seed(value) => value,
            StageInput::Combined(combined) => combined
                .iter()
                .try_fold(0_i64, |acc, (_, v)| acc.checked_add(*v))
                .ok_or_else(|| overflow(ctx))?,
        };
        if value == 0 {
            return Err(TransformError::new(format!(
                "{} cannot be 0",
                ctx.stage_id().as_str().to_lowercase()
            )));
        }
        value.checked_mul(2).ok_or_else(|| overflow(ctx))
    }
}

/// Sums the values of its upstreams. A seed is passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumTransform;

#[async_trait]
impl Transform<i64> for SumTransform {
    async fn apply(&self, ctx: &StageContext, input: StageInput<i64>) -> Result<i64, TransformError> {
        match input {
            StageInput::Seed(value) => Ok(value),
            StageInput::Combined(combined) => combined
                .iter()
                .try_fold(0_i64, |acc, (_, v)| acc.checked_add(*v))
                .ok_or_else(|| overflow(ctx)),
        }
    }
}

/// A transform that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingTransform {
    message: String,
}

impl FailingTransform {
    /// Creates a failing transform.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Transform<T> for FailingTransform {
    async fn apply(&self, _ctx: &StageContext, _input: StageInput<T>) -> Result<T, TransformError> {
        Err(TransformError::new(self.message.clone()))
    }
}

/// Sleeps before delegating to an inner transform.
///
/// The sleep ignores the deadline, so the stage keeps running after its run
/// has been decided.
pub struct SlowTransform<T> {
    delay: Duration,
    inner: Arc<dyn Transform<T>>,
}

impl<T: Send + 'static> SlowTransform<T> {
    /// Wraps `inner` with a fixed delay.
    #[must_use]
    pub fn new(delay: Duration, inner: Arc<dyn Transform<T>>) -> Self {
        Self { delay, inner }
    }
}

impl<T> fmt::Debug for SlowTransform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowTransform")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> Transform<T> for SlowTransform<T> {
    async fn apply(&self, ctx: &StageContext, input: StageInput<T>) -> Result<T, TransformError> {
        tokio::time::sleep(self.delay).await;
        self.inner.apply(ctx, input).await
    }
}

/// Records each call before delegating to an inner transform.
pub struct RecordingTransform<T> {
    inner: Arc<dyn Transform<T>>,
    calls: Mutex<Vec<StageId>>,
}

impl<T: Send + 'static> RecordingTransform<T> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Transform<T>>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the transform was applied.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the stage ids of each call, in call order.
    #[must_use]
    pub fn recorded_stages(&self) -> Vec<StageId> {
        self.calls.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

impl<T> fmt::Debug for RecordingTransform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingTransform")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> Transform<T> for RecordingTransform<T> {
    async fn apply(&self, ctx: &StageContext, input: StageInput<T>) -> Result<T, TransformError> {
        self.calls.lock().push(ctx.stage_id().clone());
        self.inner.apply(ctx, input).await
    }
}
