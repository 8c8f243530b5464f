//! Lifecycle events emitted while a pipeline runs.
//!
//! Stage tasks and the coordinator report what they do through an
//! [`EventSink`]. The default sink discards everything; the logging sink
//! forwards to `tracing`; the collecting sink keeps events for tests.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::cancellation::CancelReason;
use crate::stages::StageId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A lifecycle event of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The coordinator left `Idle`.
    RunStarted {
        /// Pipeline name.
        pipeline: String,
        /// When the run started.
        started_at: DateTime<Utc>,
    },
    /// A stage task began executing its transform.
    StageStarted {
        /// The stage.
        stage: StageId,
    },
    /// A stage published a value.
    StageCompleted {
        /// The stage.
        stage: StageId,
        /// Time spent in the transform.
        duration_ms: f64,
    },
    /// A stage published a failure.
    StageFailed {
        /// The stage.
        stage: StageId,
        /// The failure message.
        error: String,
        /// Time spent in the transform.
        duration_ms: f64,
    },
    /// A stage published a cancellation.
    StageCancelled {
        /// The stage.
        stage: StageId,
        /// Why the run was cancelled.
        reason: CancelReason,
    },
    /// The run reached `Succeeded`.
    RunSucceeded {
        /// Wall time of the run.
        duration_ms: f64,
    },
    /// The run reached `Failed`.
    RunFailed {
        /// The stage blamed for the failure, if any.
        stage: Option<StageId>,
        /// The failure message.
        error: String,
        /// Wall time of the run.
        duration_ms: f64,
    },
    /// The run reached `Cancelled`.
    RunCancelled {
        /// Why the run was cancelled.
        reason: CancelReason,
        /// Wall time of the run.
        duration_ms: f64,
    },
}

impl PipelineEvent {
    /// Returns the dotted event name (e.g. `stage.started`).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::StageStarted { .. } => "stage.started",
            Self::StageCompleted { .. } => "stage.completed",
            Self::StageFailed { .. } => "stage.failed",
            Self::StageCancelled { .. } => "stage.cancelled",
            Self::RunSucceeded { .. } => "run.succeeded",
            Self::RunFailed { .. } => "run.failed",
            Self::RunCancelled { .. } => "run.cancelled",
        }
    }

    /// Serializes the event together with the run it belongs to.
    #[must_use]
    pub fn to_json(&self, run_id: Uuid) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(map) = value.as_object_mut() {
            map.insert("run_id".to_string(), serde_json::json!(run_id.to_string()));
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = PipelineEvent::StageStarted {
            stage: StageId::from("A"),
        };
        assert_eq!(event.name(), "stage.started");

        let event = PipelineEvent::RunCancelled {
            reason: CancelReason::Timeout,
            duration_ms: 1.0,
        };
        assert_eq!(event.name(), "run.cancelled");
    }

    #[test]
    fn test_event_to_json() {
        let run_id = Uuid::new_v4();
        let event = PipelineEvent::StageFailed {
            stage: StageId::from("A"),
            error: "a cannot be 0".to_string(),
            duration_ms: 0.5,
        };

        let json = event.to_json(run_id);
        assert_eq!(json["event"], "stage_failed");
        assert_eq!(json["stage"], "A");
        assert_eq!(json["error"], "a cannot be 0");
        assert_eq!(json["run_id"], run_id.to_string());
    }
}
