//! Error types for the joinflow pipeline.
//!
//! The taxonomy is layered: a stage's own computation fails with a
//! [`TransformError`], the aggregator turns the first upstream failure into an
//! [`AggregationError`], deadline expiry and manual cancellation surface as a
//! [`CancellationError`], and callers only ever see a [`PipelineError`].

use crate::cancellation::CancelReason;
use crate::stages::StageId;
use std::collections::HashMap;
use thiserror::Error;

/// Error produced by a stage's transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The transform ran and rejected its input.
    #[error("{message}")]
    Failed {
        /// Human-readable cause.
        message: String,
    },

    /// The transform observed the run's deadline token and gave up.
    #[error("transform cancelled: {0}")]
    Cancelled(CancelReason),

    /// The stage task ended without publishing an outcome.
    #[error("stage task terminated without publishing an outcome")]
    Terminated,
}

impl TransformError {
    /// Creates a failure with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Returns the failure message, if this is a plain failure.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed { message } => Some(message),
            _ => None,
        }
    }
}

impl From<&str> for TransformError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TransformError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A dependent stage could not be assembled because an upstream failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream stage '{stage_id}' failed: {cause}")]
pub struct AggregationError {
    /// The upstream stage that failed first.
    pub stage_id: StageId,
    /// The upstream's transform error.
    pub cause: TransformError,
}

impl AggregationError {
    /// Creates a new aggregation error.
    #[must_use]
    pub fn new(stage_id: impl Into<StageId>, cause: TransformError) -> Self {
        Self {
            stage_id: stage_id.into(),
            cause,
        }
    }
}

/// The run's deadline token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pipeline cancelled: {reason}")]
pub struct CancellationError {
    /// Why the token fired.
    pub reason: CancelReason,
}

impl CancellationError {
    /// Creates a new cancellation error.
    #[must_use]
    pub const fn new(reason: CancelReason) -> Self {
        Self { reason }
    }
}

/// The terminal error returned to callers of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A stage failed; the first failure observed wins.
    #[error("stage '{stage_id}' failed: {cause}")]
    StageFailed {
        /// The failing stage.
        stage_id: StageId,
        /// The stage's transform error.
        cause: TransformError,
    },

    /// The run was cancelled by its deadline or manually.
    #[error("pipeline cancelled: {reason}")]
    Cancelled {
        /// Why the run was cancelled.
        reason: CancelReason,
    },

    /// A producer stage was not given a seed input.
    #[error("no input provided for producer stage '{stage_id}'")]
    MissingInput {
        /// The producer stage without input.
        stage_id: StageId,
    },

    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),
}

impl PipelineError {
    /// Returns true if the run ended because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if the run ended because its deadline expired.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Cancelled {
                reason: CancelReason::Timeout
            }
        )
    }

    /// Returns the stage this error is attributed to, if any.
    #[must_use]
    pub const fn stage_id(&self) -> Option<&StageId> {
        match self {
            Self::StageFailed { stage_id, .. } | Self::MissingInput { stage_id } => Some(stage_id),
            Self::Cancelled { .. } | Self::Validation(_) => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::StageFailed { stage_id, cause } => {
                map.insert("type".to_string(), serde_json::json!("StageFailed"));
                map.insert("stage_id".to_string(), serde_json::json!(stage_id.as_str()));
                map.insert("cause".to_string(), serde_json::json!(cause.to_string()));
            }
            Self::Cancelled { reason } => {
                map.insert("type".to_string(), serde_json::json!("Cancelled"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::MissingInput { stage_id } => {
                map.insert("type".to_string(), serde_json::json!("MissingInput"));
                map.insert("stage_id".to_string(), serde_json::json!(stage_id.as_str()));
            }
            Self::Validation(err) => {
                map.insert("type".to_string(), serde_json::json!("Validation"));
                map.insert("stages".to_string(), serde_json::json!(err.stages));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<AggregationError> for PipelineError {
    fn from(err: AggregationError) -> Self {
        Self::StageFailed {
            stage_id: err.stage_id,
            cause: err.cause,
        }
    }
}

impl From<CancellationError> for PipelineError {
    fn from(err: CancellationError) -> Self {
        Self::Cancelled { reason: err.reason }
    }
}

/// Error raised when a pipeline definition fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_from_str() {
        let err: TransformError = "a cannot be 0".into();
        assert_eq!(err.message(), Some("a cannot be 0"));
        assert_eq!(err.to_string(), "a cannot be 0");
    }

    #[test]
    fn test_aggregation_error_converts_to_stage_failed() {
        let err = AggregationError::new("A", TransformError::new("boom"));
        let pipeline_err: PipelineError = err.into();

        assert_eq!(
            pipeline_err,
            PipelineError::StageFailed {
                stage_id: StageId::from("A"),
                cause: TransformError::new("boom"),
            }
        );
        assert_eq!(pipeline_err.stage_id().map(StageId::as_str), Some("A"));
    }

    #[test]
    fn test_cancellation_error_converts() {
        let err: PipelineError = CancellationError::new(CancelReason::Timeout).into();
        assert!(err.is_cancelled());
        assert!(err.is_timeout());

        let err: PipelineError = CancellationError::new(CancelReason::Manual).into();
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_pipeline_error_to_dict() {
        let err = PipelineError::StageFailed {
            stage_id: StageId::from("A"),
            cause: TransformError::new("a cannot be 0"),
        };
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "StageFailed");
        assert_eq!(dict.get("stage_id").unwrap(), "A");
        assert_eq!(dict.get("cause").unwrap(), "a cannot be 0");
    }

    #[test]
    fn test_cancelled_to_dict_uses_snake_case_reason() {
        let err = PipelineError::Cancelled {
            reason: CancelReason::Timeout,
        };
        assert_eq!(err.to_dict().get("reason").unwrap(), "timeout");
    }

    #[test]
    fn test_validation_error_with_stages() {
        let err = PipelineValidationError::new("bad")
            .with_stages(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.stages.len(), 2);
        assert_eq!(err.to_string(), "bad");
    }
}
