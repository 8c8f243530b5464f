//! Single-publish outcome slots.

use super::StageId;
use crate::cancellation::CancelReason;
use crate::errors::TransformError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The terminal result of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The transform produced a value.
    Value(T),
    /// The transform failed.
    Failure(TransformError),
    /// The stage gave up because the run was cancelled.
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// Builds an outcome from a transform result.
    ///
    /// A transform that reports cooperative cancellation becomes `Cancelled`.
    #[must_use]
    pub fn from_result(result: Result<T, TransformError>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(TransformError::Cancelled(reason)) => Self::Cancelled(reason),
            Err(err) => Self::Failure(err),
        }
    }

    /// Returns true if this outcome carries a value.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns a short label used in logs and events.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Failure(_) => "failure",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// Creates the write and read ends of a stage's outcome slot.
#[must_use]
pub fn outcome_slot<T>(stage_id: impl Into<StageId>) -> (OutcomeSender<T>, OutcomeReceiver<T>) {
    let stage_id = stage_id.into();
    let (tx, rx) = oneshot::channel();
    (
        OutcomeSender {
            stage_id: stage_id.clone(),
            tx,
        },
        OutcomeReceiver { stage_id, rx },
    )
}

/// Write end of an outcome slot.
///
/// [`publish`](Self::publish) consumes the sender, so a stage can publish at
/// most once.
#[derive(Debug)]
pub struct OutcomeSender<T> {
    stage_id: StageId,
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> OutcomeSender<T> {
    /// Returns the publishing stage.
    #[must_use]
    pub fn stage_id(&self) -> &StageId {
        &self.stage_id
    }

    /// Publishes the outcome without blocking.
    ///
    /// Returns false if the reader has gone away; the outcome is dropped.
    pub fn publish(self, outcome: Outcome<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// Returns true if the reader has been dropped.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read end of an outcome slot.
///
/// Resolves to the published outcome. A sender dropped without publishing
/// (for example because the transform panicked) resolves to
/// `Failure(TransformError::Terminated)`.
#[derive(Debug)]
pub struct OutcomeReceiver<T> {
    stage_id: StageId,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> OutcomeReceiver<T> {
    /// Returns the stage this slot belongs to.
    #[must_use]
    pub fn stage_id(&self) -> &StageId {
        &self.stage_id
    }
}

impl<T> Future for OutcomeReceiver<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Outcome::Failure(TransformError::Terminated)))
    }
}
