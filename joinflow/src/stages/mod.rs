//! Stages and their transforms.
//!
//! A stage is a named computation unit: it receives one input, applies a
//! fallible transform, and publishes exactly one [`Outcome`].

mod executor;
mod outcome;

pub use executor::StageExecutor;
pub use outcome::{outcome_slot, Outcome, OutcomeReceiver, OutcomeSender};

use crate::aggregator::CombinedInput;
use crate::cancellation::DeadlineToken;
use crate::errors::TransformError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::future::Future;
use uuid::Uuid;

/// Identifier of a stage within a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Creates a new stage id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&StageId> for StageId {
    fn from(id: &StageId) -> Self {
        id.clone()
    }
}

/// Read-only view of the run handed to a transform.
#[derive(Debug, Clone)]
pub struct StageContext {
    stage_id: StageId,
    run_id: Uuid,
    deadline: DeadlineToken,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(stage_id: impl Into<StageId>, run_id: Uuid, deadline: DeadlineToken) -> Self {
        Self {
            stage_id: stage_id.into(),
            run_id,
            deadline,
        }
    }

    /// Returns the id of the executing stage.
    #[must_use]
    pub fn stage_id(&self) -> &StageId {
        &self.stage_id
    }

    /// Returns the id of the pipeline run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the run's deadline token.
    #[must_use]
    pub fn deadline(&self) -> &DeadlineToken {
        &self.deadline
    }

    /// Returns whether the run has been cancelled or timed out.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.deadline.is_cancelled()
    }
}

/// Input handed to a stage's transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput<T> {
    /// Caller-supplied input of a producer stage.
    Seed(T),
    /// Upstream values merged for a dependent stage.
    Combined(CombinedInput<T>),
}

impl<T> StageInput<T> {
    /// Returns the seed value, if this is a producer input.
    #[must_use]
    pub const fn as_seed(&self) -> Option<&T> {
        match self {
            Self::Seed(value) => Some(value),
            Self::Combined(_) => None,
        }
    }

    /// Returns the combined input, if this is a dependent-stage input.
    #[must_use]
    pub const fn as_combined(&self) -> Option<&CombinedInput<T>> {
        match self {
            Self::Combined(combined) => Some(combined),
            Self::Seed(_) => None,
        }
    }

    /// Takes the seed value, failing if the stage was wired as a dependent.
    pub fn into_seed(self) -> Result<T, TransformError> {
        match self {
            Self::Seed(value) => Ok(value),
            Self::Combined(_) => Err(TransformError::new(
                "expected a seed input, got combined upstream values",
            )),
        }
    }

    /// Takes the combined input, failing if the stage was wired as a producer.
    pub fn into_combined(self) -> Result<CombinedInput<T>, TransformError> {
        match self {
            Self::Combined(combined) => Ok(combined),
            Self::Seed(_) => Err(TransformError::new(
                "expected combined upstream values, got a seed input",
            )),
        }
    }
}

/// The computation performed by a stage.
///
/// Transforms should be pure functions of their input. Long-running
/// transforms may poll [`StageContext::is_cancelled`] and return
/// [`TransformError::Cancelled`] to stop early; nothing forces them to.
#[async_trait]
pub trait Transform<T: Send + 'static>: Send + Sync + Debug {
    /// Applies the transform.
    async fn apply(&self, ctx: &StageContext, input: StageInput<T>) -> Result<T, TransformError>;
}

/// A transform backed by a synchronous closure.
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> FnTransform<F> {
    /// Creates a new function-based transform.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F> Transform<T> for FnTransform<F>
where
    T: Send + 'static,
    F: Fn(StageInput<T>) -> Result<T, TransformError> + Send + Sync,
{
    async fn apply(&self, _ctx: &StageContext, input: StageInput<T>) -> Result<T, TransformError> {
        (self.func)(input)
    }
}

/// A transform backed by an async closure.
pub struct AsyncFnTransform<F> {
    name: String,
    func: F,
}

impl<F> AsyncFnTransform<F> {
    /// Creates a new async function-based transform.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for AsyncFnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnTransform")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F, Fut> Transform<T> for AsyncFnTransform<F>
where
    T: Send + 'static,
    F: Fn(StageContext, StageInput<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, TransformError>> + Send,
{
    async fn apply(&self, ctx: &StageContext, input: StageInput<T>) -> Result<T, TransformError> {
        (self.func)(ctx.clone(), input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_context(id: &str) -> StageContext {
        let (token, _handle) = DeadlineToken::new(Duration::from_secs(5));
        StageContext::new(id, Uuid::new_v4(), token)
    }

    #[tokio::test]
    async fn test_fn_transform() {
        let transform = FnTransform::new(
            "double",
            |input: StageInput<i64>| -> Result<i64, TransformError> { Ok(input.into_seed()? * 2) },
        );

        let ctx = test_context("A");
        let out = transform.apply(&ctx, StageInput::Seed(21)).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_async_fn_transform_sees_context() {
        let transform = AsyncFnTransform::new("named", |ctx: StageContext, input: StageInput<String>| async move {
            let seed = input.into_seed()?;
            Ok::<_, TransformError>(format!("{}:{}", ctx.stage_id(), seed))
        });

        let ctx = test_context("B");
        let out = transform.apply(&ctx, StageInput::Seed("x".to_string())).await;
        assert_eq!(out, Ok("B:x".to_string()));
    }

    #[test]
    fn test_stage_input_accessors() {
        let seed = StageInput::Seed(3);
        assert_eq!(seed.as_seed(), Some(&3));
        assert!(seed.as_combined().is_none());
        assert!(seed.clone().into_combined().is_err());
        assert_eq!(seed.into_seed(), Ok(3));

        let combined: StageInput<i32> = StageInput::Combined(CombinedInput::default());
        assert!(combined.as_seed().is_none());
        assert!(combined.into_seed().is_err());
    }

    #[test]
    fn test_stage_id_conversions() {
        let id = StageId::from("A");
        assert_eq!(id.as_str(), "A");
        assert_eq!(id.to_string(), "A");
        assert_eq!(StageId::new(String::from("A")), id);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""A""#);
    }
}
