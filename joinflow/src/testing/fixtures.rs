//! Fixtures for the canonical `A, B -> C` pipeline.

use std::sync::Arc;
use std::time::Duration;

use super::{DoubleTransform, SumTransform};
use crate::errors::PipelineValidationError;
use crate::events::EventSink;
use crate::pipeline::{Pipeline, PipelineBuilder, RunInputs};
use crate::stages::Transform;

/// Builds `A(x) = 2x`, `B(y) = 2y`, `C = A + B` with the given stage C.
///
/// Pass `None` for `c` to use [`SumTransform`].
pub fn abc_pipeline(
    timeout: Duration,
    events: Arc<dyn EventSink>,
    c: Option<Arc<dyn Transform<i64>>>,
) -> Result<Pipeline<i64>, PipelineValidationError> {
    let c: Arc<dyn Transform<i64>> = match c {
        Some(c) => c,
        None => Arc::new(SumTransform),
    };
    PipelineBuilder::<i64>::new("abc")
        .timeout(timeout)
        .event_sink(events)
        .producer("A", Arc::new(DoubleTransform))?
        .producer("B", Arc::new(DoubleTransform))?
        .stage("C", c, &["A", "B"])?
        .build()
}

/// Seeds for the canonical pipeline.
#[must_use]
pub fn abc_inputs(a: i64, b: i64) -> RunInputs<i64> {
    RunInputs::new().with("A", a).with("B", b)
}
