//! Pipeline coordinator: launches stages, drives the wait points and records
//! the terminal state of each run.

use super::{RunState, StageSpec};
use crate::aggregator::Aggregator;
use crate::cancellation::{CancelHandle, DeadlineToken};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::{EventSink, PipelineEvent};
use crate::stages::{StageExecutor, StageId, StageInput};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Seed inputs of a run, keyed by producer stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInputs<T> {
    values: HashMap<StageId, T>,
}

impl<T> Default for RunInputs<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T> RunInputs<T> {
    /// Creates an empty input set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the seed for a producer stage.
    #[must_use]
    pub fn with(mut self, stage_id: impl Into<StageId>, value: T) -> Self {
        self.insert(stage_id, value);
        self
    }

    /// Adds the seed for a producer stage, returning any previous seed.
    pub fn insert(&mut self, stage_id: impl Into<StageId>, value: T) -> Option<T> {
        self.values.insert(stage_id.into(), value)
    }

    /// Removes and returns the seed for a stage.
    pub fn take(&mut self, stage_id: &str) -> Option<T> {
        self.values.remove(stage_id)
    }

    /// Returns the number of seeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no seeds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T, K: Into<StageId>> FromIterator<(K, T)> for RunInputs<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A validated, reusable pipeline definition.
///
/// Cloning is cheap; stage definitions are shared.
pub struct Pipeline<T: Send + 'static> {
    config: PipelineConfig,
    stages: Arc<[StageSpec<T>]>,
    events: Arc<dyn EventSink>,
}

impl<T: Send + 'static> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            stages: self.stages.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T> Pipeline<T>
where
    T: Clone + Send + 'static,
{
    pub(super) fn new(
        config: PipelineConfig,
        stages: Vec<StageSpec<T>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            stages: stages.into(),
            events,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the per-run timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Returns the stage ids in declaration order.
    pub fn stage_ids(&self) -> impl Iterator<Item = &StageId> {
        self.stages.iter().map(|s| &s.id)
    }

    /// Returns the stage whose value is the result of a run: the last one declared.
    #[must_use]
    pub fn sink_id(&self) -> &StageId {
        // The builder refuses to build an empty pipeline.
        &self.stages[self.stages.len() - 1].id
    }

    /// Creates a new run. Its deadline starts counting now.
    #[must_use]
    pub fn new_run(&self) -> PipelineRun<T> {
        PipelineRun::new(self.clone())
    }

    /// Creates a run and executes it.
    pub async fn execute(&self, inputs: RunInputs<T>) -> Result<T, PipelineError> {
        self.new_run().execute(inputs).await
    }
}

impl<T: Send + 'static> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

/// One execution of a pipeline.
///
/// The run owns its deadline token. Stages only read it; the caller can
/// cancel through [`cancel_handle`](Self::cancel_handle).
pub struct PipelineRun<T: Send + 'static> {
    run_id: Uuid,
    pipeline: Pipeline<T>,
    state: RunState,
    deadline: DeadlineToken,
    cancel: CancelHandle,
    result: Option<Result<T, PipelineError>>,
}

impl<T> PipelineRun<T>
where
    T: Clone + Send + 'static,
{
    fn new(pipeline: Pipeline<T>) -> Self {
        let (deadline, cancel) = DeadlineToken::new(pipeline.timeout());
        Self {
            run_id: Uuid::new_v4(),
            pipeline,
            state: RunState::Idle,
            deadline,
            cancel,
            result: None,
        }
    }

    /// Returns the id of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Returns a handle that cancels this run.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the run's deadline token.
    #[must_use]
    pub fn deadline(&self) -> &DeadlineToken {
        &self.deadline
    }

    /// Returns the terminal result, once the run has finished.
    #[must_use]
    pub fn result(&self) -> Option<&Result<T, PipelineError>> {
        self.result.as_ref()
    }

    /// Executes the run and returns its terminal result.
    ///
    /// Returns as soon as the outcome is decided; stages still in flight are
    /// abandoned and left to finish on their own. Calling this again after
    /// the run has finished returns the recorded result without running
    /// anything.
    pub async fn execute(&mut self, inputs: RunInputs<T>) -> Result<T, PipelineError> {
        if let Some(result) = &self.result {
            debug!(run_id = %self.run_id, state = %self.state, "Run already finished");
            return result.clone();
        }

        let start = Instant::now();
        self.state = RunState::Running;
        let span = info_span!("pipeline_run", pipeline = %self.pipeline.name(), run_id = %self.run_id);

        self.pipeline
            .events
            .emit(
                self.run_id,
                PipelineEvent::RunStarted {
                    pipeline: self.pipeline.name().to_string(),
                    started_at: Utc::now(),
                },
            )
            .await;

        let result = self.drive(inputs).instrument(span).await;
        self.finish(result, start).await
    }

    async fn drive(&self, mut inputs: RunInputs<T>) -> Result<T, PipelineError> {
        let stages = &self.pipeline.stages;

        // Resolve every seed before launching anything.
        let mut seeds = Vec::new();
        for spec in stages.iter().filter(|s| s.is_producer()) {
            let seed = inputs
                .take(spec.id.as_str())
                .ok_or_else(|| PipelineError::MissingInput {
                    stage_id: spec.id.clone(),
                })?;
            seeds.push((spec, seed));
        }
        if !inputs.is_empty() {
            warn!(unused = inputs.len(), "Ignoring inputs for non-producer stages");
        }

        if let Some(reason) = self.deadline.reason() {
            return Err(PipelineError::Cancelled { reason });
        }

        let executor = StageExecutor::new(self.run_id, self.pipeline.events.clone());
        let mut aggregator = Aggregator::new();

        for (spec, seed) in seeds {
            debug!(stage = %spec.id, "Launching producer stage");
            aggregator.track(executor.spawn(
                spec.id.clone(),
                spec.transform.clone(),
                StageInput::Seed(seed),
                self.deadline.clone(),
            ));
        }

        for spec in stages.iter().filter(|s| !s.is_producer()) {
            let combined = aggregator.await_all(&spec.upstreams, &self.deadline).await?;
            debug!(stage = %spec.id, upstreams = combined.len(), "Launching dependent stage");
            aggregator.track(executor.spawn(
                spec.id.clone(),
                spec.transform.clone(),
                StageInput::Combined(combined),
                self.deadline.clone(),
            ));
        }

        let sink = self.pipeline.sink_id();
        let value = aggregator.await_one(sink, &self.deadline).await?;
        if aggregator.in_flight() > 0 {
            debug!(abandoned = aggregator.in_flight(), "Abandoning unread stage outcomes");
        }
        Ok(value)
    }

    async fn finish(
        &mut self,
        result: Result<T, PipelineError>,
        start: Instant,
    ) -> Result<T, PipelineError> {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (state, event) = match &result {
            Ok(_) => {
                info!(run_id = %self.run_id, duration_ms, "Pipeline run succeeded");
                (RunState::Succeeded, PipelineEvent::RunSucceeded { duration_ms })
            }
            Err(PipelineError::Cancelled { reason }) => {
                warn!(run_id = %self.run_id, reason = %reason, duration_ms, "Pipeline run cancelled");
                (
                    RunState::Cancelled,
                    PipelineEvent::RunCancelled {
                        reason: *reason,
                        duration_ms,
                    },
                )
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, duration_ms, "Pipeline run failed");
                (
                    RunState::Failed,
                    PipelineEvent::RunFailed {
                        stage: err.stage_id().cloned(),
                        error: err.to_string(),
                        duration_ms,
                    },
                )
            }
        };

        self.state = state;
        self.pipeline.events.emit(self.run_id, event).await;
        self.result = Some(result.clone());
        result
    }
}

impl<T: Send + 'static> std::fmt::Debug for PipelineRun<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline.config.name)
            .field("state", &self.state)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancelReason;
    use crate::errors::TransformError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::testing::{DoubleTransform, SumTransform};
    use pretty_assertions::assert_eq;

    fn canonical(sink: Arc<CollectingEventSink>) -> Pipeline<i64> {
        PipelineBuilder::<i64>::new("abc")
            .event_sink(sink)
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .producer("B", Arc::new(DoubleTransform))
            .unwrap()
            .stage("C", Arc::new(SumTransform), &["A", "B"])
            .unwrap()
            .build()
            .unwrap()
    }

    fn inputs(a: i64, b: i64) -> RunInputs<i64> {
        RunInputs::new().with("A", a).with("B", b)
    }

    #[tokio::test]
    async fn test_run_state_transitions() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = canonical(sink.clone());
        let mut run = pipeline.new_run();
        assert_eq!(run.state(), RunState::Idle);
        assert!(run.result().is_none());

        let value = run.execute(inputs(1, 2)).await;

        assert_eq!(value, Ok(6));
        assert_eq!(run.state(), RunState::Succeeded);
        assert_eq!(sink.names().first(), Some(&"run.started"));
        assert_eq!(sink.names().last(), Some(&"run.succeeded"));
        assert_eq!(sink.run_ids(), vec![run.run_id()]);
    }

    #[tokio::test]
    async fn test_second_execute_returns_recorded_result() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = canonical(sink.clone());
        let mut run = pipeline.new_run();

        let first = run.execute(inputs(0, 2)).await;
        let events_after_first = sink.len();
        let second = run.execute(inputs(1, 2)).await;

        assert_eq!(first, second);
        assert_eq!(run.state(), RunState::Failed);
        assert_eq!(sink.len(), events_after_first);
    }

    #[tokio::test]
    async fn test_missing_input_launches_nothing() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = canonical(sink.clone());
        let mut run = pipeline.new_run();

        let err = run.execute(RunInputs::new().with("A", 1)).await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::MissingInput {
                stage_id: StageId::from("B")
            }
        );
        assert_eq!(run.state(), RunState::Failed);
        assert!(sink.events_of_type("stage.").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_execute() {
        let pipeline = canonical(Arc::new(CollectingEventSink::new()));
        let mut run = pipeline.new_run();
        run.cancel_handle().cancel();

        let err = run.execute(inputs(1, 2)).await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::Cancelled {
                reason: CancelReason::Manual
            }
        );
        assert_eq!(run.state(), RunState::Cancelled);
    }

    #[tokio::test]
    async fn test_failed_run_reports_stage() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = canonical(sink.clone());

        let err = pipeline.execute(inputs(0, 2)).await.unwrap_err();

        assert_eq!(
            err,
            PipelineError::StageFailed {
                stage_id: StageId::from("A"),
                cause: TransformError::new("a cannot be 0"),
            }
        );
        let failed = sink.events_of_type("run.failed");
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn test_run_inputs() {
        let mut inputs: RunInputs<i64> = [("A", 1), ("B", 2)].into_iter().collect();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.insert("A", 5), Some(1));
        assert_eq!(inputs.take("A"), Some(5));
        assert_eq!(inputs.take("A"), None);
        assert!(!inputs.is_empty());
    }
}
