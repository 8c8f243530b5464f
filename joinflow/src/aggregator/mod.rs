//! Waiting on stage outcomes.
//!
//! The [`Aggregator`] owns the read end of every outcome slot in a run and
//! turns a set of upstream outcomes into a [`CombinedInput`], or into the
//! first failure or cancellation it observes.
//!
//! Precedence when several events are observable in the same step:
//! a failure beats a cancellation, which beats a value.

mod combined;

pub use combined::CombinedInput;

use crate::cancellation::DeadlineToken;
use crate::errors::{AggregationError, CancellationError, PipelineError, TransformError};
use crate::stages::{Outcome, OutcomeReceiver, StageId};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashMap;
use tracing::{debug, warn};

type Arrival<T> = (StageId, Outcome<T>);

/// Collects outcomes of in-flight stages with fail-fast semantics.
///
/// Outcomes of every tracked stage are observed while waiting, not only the
/// ones being waited for: a failure anywhere in the run ends the wait. Values
/// that arrive early are kept for later waits.
pub struct Aggregator<T> {
    pending: FuturesUnordered<BoxFuture<'static, Arrival<T>>>,
    resolved: HashMap<StageId, T>,
}

impl<T> Default for Aggregator<T> {
    fn default() -> Self {
        Self {
            pending: FuturesUnordered::new(),
            resolved: HashMap::new(),
        }
    }
}

impl<T> Aggregator<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an aggregator with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts observing a stage's outcome slot.
    pub fn track(&mut self, receiver: OutcomeReceiver<T>) {
        let stage_id = receiver.stage_id().clone();
        self.pending
            .push(async move { (stage_id, receiver.await) }.boxed());
    }

    /// Returns the number of stages whose outcome has not been observed yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Returns an already-observed value.
    #[must_use]
    pub fn resolved(&self, stage_id: &str) -> Option<&T> {
        self.resolved.get(stage_id)
    }

    /// Waits until every stage in `upstreams` has produced a value.
    ///
    /// Returns early with `StageFailed` on the first failure observed from
    /// any tracked stage, or with `Cancelled` once the deadline fires.
    /// Outcomes still outstanding at that point are abandoned, not cancelled.
    pub async fn await_all(
        &mut self,
        upstreams: &[StageId],
        deadline: &DeadlineToken,
    ) -> Result<CombinedInput<T>, PipelineError> {
        loop {
            let ready = self.drain_ready();
            self.settle(ready)?;

            if let Some(reason) = deadline.reason() {
                debug!(reason = %reason, in_flight = self.in_flight(), "Wait cancelled");
                return Err(CancellationError::new(reason).into());
            }

            if let Some(missing) = upstreams.iter().find(|id| !self.resolved.contains_key(*id)) {
                if self.pending.is_empty() {
                    warn!(stage = %missing, "Awaited stage is not in flight");
                    return Err(AggregationError::new(missing, TransformError::Terminated).into());
                }
            } else {
                return Ok(upstreams
                    .iter()
                    .filter_map(|id| self.resolved.get(id).map(|v| (id.clone(), v.clone())))
                    .collect());
            }

            tokio::select! {
                biased;
                arrival = self.pending.next() => {
                    if let Some(arrival) = arrival {
                        let mut batch = vec![arrival];
                        batch.extend(self.drain_ready());
                        self.settle(batch)?;
                    }
                }
                _ = deadline.cancelled() => {}
            }
        }
    }

    /// Waits for a single stage's value.
    pub async fn await_one(
        &mut self,
        stage_id: &StageId,
        deadline: &DeadlineToken,
    ) -> Result<T, PipelineError> {
        let mut combined = self
            .await_all(std::slice::from_ref(stage_id), deadline)
            .await?;
        combined
            .take(stage_id.as_str())
            .ok_or_else(|| AggregationError::new(stage_id, TransformError::Terminated).into())
    }

    /// Collects every outcome that is ready without waiting.
    fn drain_ready(&mut self) -> Vec<Arrival<T>> {
        let mut ready = Vec::new();
        while let Some(Some(arrival)) = self.pending.next().now_or_never() {
            ready.push(arrival);
        }
        ready
    }

    /// Applies one step's worth of outcomes: failure first, then
    /// cancellation, then values.
    fn settle(&mut self, batch: Vec<Arrival<T>>) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut cancelled = None;
        let mut values = Vec::with_capacity(batch.len());
        for (stage_id, outcome) in batch {
            match outcome {
                Outcome::Failure(cause) => {
                    debug!(stage = %stage_id, error = %cause, "Upstream failed, short-circuiting");
                    return Err(AggregationError::new(stage_id, cause).into());
                }
                Outcome::Cancelled(reason) => {
                    cancelled.get_or_insert(reason);
                }
                Outcome::Value(value) => values.push((stage_id, value)),
            }
        }

        if let Some(reason) = cancelled {
            return Err(CancellationError::new(reason).into());
        }

        for (stage_id, value) in values {
            debug!(stage = %stage_id, "Upstream value received");
            self.resolved.insert(stage_id, value);
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Aggregator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut resolved: Vec<_> = self.resolved.keys().collect();
        resolved.sort();
        f.debug_struct("Aggregator")
            .field("in_flight", &self.pending.len())
            .field("resolved", &resolved)
            .finish()
    }
}
