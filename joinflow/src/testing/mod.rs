//! Testing utilities for joinflow pipelines.
//!
//! This module provides:
//! - Ready-made transforms over `i64` values
//! - Mock transforms that fail, stall or record their calls
//! - Fixtures for the canonical `A, B -> C` pipeline

mod fixtures;
mod mocks;

pub use fixtures::{abc_inputs, abc_pipeline};
pub use mocks::{DoubleTransform, FailingTransform, RecordingTransform, SlowTransform, SumTransform};
