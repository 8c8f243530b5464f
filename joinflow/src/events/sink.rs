//! Event sink trait and implementations.

use super::PipelineEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// Trait for sinks that receive pipeline lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, run_id: Uuid, event: PipelineEvent);

    /// Emits an event without blocking.
    ///
    /// Called from stage tasks; must never panic.
    fn try_emit(&self, run_id: Uuid, event: PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _run_id: Uuid, _event: PipelineEvent) {}

    fn try_emit(&self, _run_id: Uuid, _event: PipelineEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, run_id: Uuid, event: &PipelineEvent) {
        let data = event.to_json(run_id);
        if self.level == Level::DEBUG {
            debug!(event_type = %event.name(), event_data = %data, "Event: {}", event.name());
        } else {
            info!(event_type = %event.name(), event_data = %data, "Event: {}", event.name());
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, run_id: Uuid, event: PipelineEvent) {
        self.log_event(run_id, &event);
    }

    fn try_emit(&self, run_id: Uuid, event: PipelineEvent) {
        self.log_event(run_id, &event);
    }
}

/// A sink that keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(Uuid, PipelineEvent)>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Returns the names of all collected events in emission order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.read().iter().map(|(_, e)| e.name()).collect()
    }

    /// Returns events whose name starts with the prefix.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|(_, e)| e.name().starts_with(prefix))
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Returns the distinct run ids seen, in first-seen order.
    #[must_use]
    pub fn run_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = Vec::new();
        for (id, _) in self.events.read().iter() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, run_id: Uuid, event: PipelineEvent) {
        self.events.write().push((run_id, event));
    }

    fn try_emit(&self, run_id: Uuid, event: PipelineEvent) {
        self.events.write().push((run_id, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageId;

    fn started(id: &str) -> PipelineEvent {
        PipelineEvent::StageStarted {
            stage: StageId::from(id),
        }
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        let run_id = Uuid::new_v4();
        NoOpEventSink.emit(run_id, started("A")).await;
        NoOpEventSink.try_emit(run_id, started("A"));

        let sink = LoggingEventSink::debug();
        sink.emit(run_id, started("A")).await;
        LoggingEventSink::default().try_emit(run_id, started("B"));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        let run_id = Uuid::new_v4();
        sink.emit(run_id, started("A")).await;
        sink.try_emit(
            run_id,
            PipelineEvent::RunSucceeded { duration_ms: 1.0 },
        );

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.names(), vec!["stage.started", "run.succeeded"]);
        assert_eq!(sink.events_of_type("stage.").len(), 1);
        assert_eq!(sink.run_ids(), vec![run_id]);
    }
}
