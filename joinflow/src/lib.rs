//! # Joinflow
//!
//! Deadline-bounded fan-in pipelines.
//!
//! Producer stages run concurrently from caller-supplied seeds, dependent
//! stages start once every upstream has produced a value, and a whole run is
//! bounded by a single deadline:
//!
//! - **Fail-fast aggregation**: the first failure ends the run, even while
//!   other stages are still in flight
//! - **Deadline tokens**: one token per run, cancelled by timeout or by hand,
//!   first reason wins
//! - **Single-publish outcomes**: every stage publishes exactly one outcome,
//!   abandoned stages finish without affecting the run
//! - **Lifecycle events**: run and stage events through an [`events::EventSink`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use joinflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::<i64>::new("abc")
//!     .timeout(Duration::from_secs(1))
//!     .producer("A", Arc::new(DoubleTransform))?
//!     .producer("B", Arc::new(DoubleTransform))?
//!     .stage("C", Arc::new(SumTransform), &["A", "B"])?
//!     .build()?;
//!
//! let inputs = RunInputs::new().with("A", 1).with("B", 2);
//! assert_eq!(pipeline.execute(inputs).await?, 6);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregator;
pub mod cancellation;
pub mod config;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregator::{Aggregator, CombinedInput};
    pub use crate::cancellation::{CancelHandle, CancelReason, DeadlineToken};
    pub use crate::config::PipelineConfig;
    pub use crate::errors::{
        AggregationError, CancellationError, PipelineError, PipelineValidationError,
        TransformError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{
        Pipeline, PipelineBuilder, PipelineRun, RunInputs, RunState, StageSpec,
    };
    pub use crate::stages::{
        AsyncFnTransform, FnTransform, Outcome, StageContext, StageId, StageInput, Transform,
    };
}
