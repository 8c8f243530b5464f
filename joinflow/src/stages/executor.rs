//! Runs one stage as a detached task.

use super::{outcome_slot, Outcome, OutcomeReceiver, StageContext, StageId, StageInput, Transform};
use crate::cancellation::DeadlineToken;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, Instrument};
use uuid::Uuid;

/// Launches stage transforms on the tokio runtime.
///
/// Each call to [`spawn`](Self::spawn) starts one task that publishes exactly
/// one [`Outcome`]. The task is detached: dropping the returned receiver
/// abandons the outcome but lets the transform run to completion.
#[derive(Clone)]
pub struct StageExecutor {
    run_id: Uuid,
    events: Arc<dyn EventSink>,
}

impl StageExecutor {
    /// Creates an executor for the given run.
    #[must_use]
    pub fn new(run_id: Uuid, events: Arc<dyn EventSink>) -> Self {
        Self { run_id, events }
    }

    /// Creates an executor that emits no events.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Uuid::new_v4(), Arc::new(NoOpEventSink))
    }

    /// Returns the run this executor belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Runs `transform(input)` on its own task and returns the outcome slot.
    ///
    /// If the deadline has already fired when the task starts, the transform
    /// is skipped and `Cancelled` is published.
    pub fn spawn<T>(
        &self,
        stage_id: StageId,
        transform: Arc<dyn Transform<T>>,
        input: StageInput<T>,
        deadline: DeadlineToken,
    ) -> OutcomeReceiver<T>
    where
        T: Send + 'static,
    {
        let (sender, receiver) = outcome_slot(stage_id.clone());
        let run_id = self.run_id;
        let events = self.events.clone();
        let span = debug_span!("stage", run_id = %run_id, stage = %stage_id);

        tokio::spawn(
            async move {
                if let Some(reason) = deadline.reason() {
                    debug!(reason = %reason, "Skipping stage, run already cancelled");
                    events.try_emit(
                        run_id,
                        PipelineEvent::StageCancelled {
                            stage: stage_id,
                            reason,
                        },
                    );
                    sender.publish(Outcome::Cancelled(reason));
                    return;
                }

                events.try_emit(
                    run_id,
                    PipelineEvent::StageStarted {
                        stage: stage_id.clone(),
                    },
                );

                let ctx = StageContext::new(stage_id.clone(), run_id, deadline);
                let start = Instant::now();
                let outcome = Outcome::from_result(transform.apply(&ctx, input).await);
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                let event = match &outcome {
                    Outcome::Value(_) => PipelineEvent::StageCompleted {
                        stage: stage_id,
                        duration_ms,
                    },
                    Outcome::Failure(err) => PipelineEvent::StageFailed {
                        stage: stage_id,
                        error: err.to_string(),
                        duration_ms,
                    },
                    Outcome::Cancelled(reason) => PipelineEvent::StageCancelled {
                        stage: stage_id,
                        reason: *reason,
                    },
                };
                events.try_emit(run_id, event);

                let label = outcome.label();
                if sender.publish(outcome) {
                    debug!(outcome = label, duration_ms, "Stage outcome published");
                } else {
                    debug!(outcome = label, duration_ms, "Stage outcome abandoned");
                }
            }
            .instrument(span),
        );

        receiver
    }
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancelReason;
    use crate::errors::TransformError;
    use crate::events::CollectingEventSink;
    use crate::stages::{AsyncFnTransform, FnTransform};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn double() -> Arc<dyn Transform<i64>> {
        Arc::new(FnTransform::new(
            "double",
            |input: StageInput<i64>| -> Result<i64, TransformError> { Ok(input.into_seed()? * 2) },
        ))
    }

    #[tokio::test]
    async fn test_spawn_publishes_value() {
        let sink = Arc::new(CollectingEventSink::new());
        let executor = StageExecutor::new(Uuid::new_v4(), sink.clone());
        let (token, _handle) = DeadlineToken::new(Duration::from_secs(1));

        let rx = executor.spawn(StageId::from("A"), double(), StageInput::Seed(4), token);

        assert_eq!(rx.await, Outcome::Value(8));
        assert_eq!(sink.names(), vec!["stage.started", "stage.completed"]);
    }

    #[tokio::test]
    async fn test_spawn_publishes_failure() {
        let executor = StageExecutor::detached();
        let (token, _handle) = DeadlineToken::never();
        let failing: Arc<dyn Transform<i64>> = Arc::new(FnTransform::new(
            "fail",
            |_input: StageInput<i64>| -> Result<i64, TransformError> { Err("a cannot be 0".into()) },
        ));

        let rx = executor.spawn(StageId::from("A"), failing, StageInput::Seed(0), token);

        assert_eq!(rx.await, Outcome::Failure(TransformError::new("a cannot be 0")));
    }

    #[tokio::test]
    async fn test_spawn_skips_transform_when_already_cancelled() {
        let executor = StageExecutor::detached();
        let (token, handle) = DeadlineToken::never();
        handle.cancel();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let transform: Arc<dyn Transform<i64>> = Arc::new(FnTransform::new(
            "record",
            move |input: StageInput<i64>| -> Result<i64, TransformError> {
                ran_clone.store(true, Ordering::SeqCst);
                input.into_seed()
            },
        ));

        let rx = executor.spawn(StageId::from("A"), transform, StageInput::Seed(1), token);

        assert_eq!(rx.await, Outcome::Cancelled(CancelReason::Manual));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_abandoned_stage_runs_to_completion() {
        let executor = StageExecutor::detached();
        let (token, _handle) = DeadlineToken::never();

        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();
        let transform: Arc<dyn Transform<i64>> = Arc::new(AsyncFnTransform::new(
            "slow",
            move |_ctx: StageContext, input: StageInput<i64>| {
                let finished = finished_clone.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    finished.store(true, Ordering::SeqCst);
                    input.into_seed()
                }
            },
        ));

        let rx = executor.spawn(StageId::from("slow"), transform, StageInput::Seed(1), token);
        drop(rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_transform_yields_terminated() {
        let executor = StageExecutor::detached();
        let (token, _handle) = DeadlineToken::never();
        let transform: Arc<dyn Transform<i64>> = Arc::new(FnTransform::new(
            "panic",
            |_input: StageInput<i64>| -> Result<i64, TransformError> { panic!("transform bug") },
        ));

        let rx = executor.spawn(StageId::from("P"), transform, StageInput::Seed(1), token);

        assert_eq!(rx.await, Outcome::Failure(TransformError::Terminated));
    }
}
