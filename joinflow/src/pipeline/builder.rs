//! Pipeline builder with validation.

use super::{Pipeline, StageSpec};
use crate::config::PipelineConfig;
use crate::errors::PipelineValidationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::{StageId, Transform};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating validated pipelines.
///
/// Stages are declared in order; a dependent stage may only name upstreams
/// that were declared before it, which also rules out cycles.
pub struct PipelineBuilder<T: Send + 'static> {
    config: PipelineConfig,
    stages: Vec<StageSpec<T>>,
    ids: HashSet<StageId>,
    events: Arc<dyn EventSink>,
}

impl<T> PipelineBuilder<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a builder with the default timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(PipelineConfig::new(name))
    }

    /// Creates a builder from an existing configuration.
    #[must_use]
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
            ids: HashSet::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the run timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Adds a producer stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or already used.
    pub fn producer(
        mut self,
        id: impl Into<StageId>,
        transform: Arc<dyn Transform<T>>,
    ) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(StageSpec::producer(id, transform))?;
        Ok(self)
    }

    /// Adds a stage fed by the values of earlier stages.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (unknown upstream, duplicate id, etc.)
    pub fn stage(
        mut self,
        id: impl Into<StageId>,
        transform: Arc<dyn Transform<T>>,
        upstreams: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        if upstreams.is_empty() {
            let id = id.into();
            return Err(PipelineValidationError::new(format!(
                "Stage '{id}' has no upstreams; declare it as a producer"
            ))
            .with_stages(vec![id.to_string()]));
        }
        self.add_stage_spec(StageSpec::dependent(id, transform, upstreams.iter().copied()))?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage_spec(&mut self, spec: StageSpec<T>) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.ids.contains(&spec.id) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is declared more than once",
                spec.id
            ))
            .with_stages(vec![spec.id.to_string()]));
        }

        for upstream in &spec.upstreams {
            if !self.ids.contains(upstream) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    spec.id, upstream
                ))
                .with_stages(vec![spec.id.to_string(), upstream.to_string()]));
            }
        }

        self.ids.insert(spec.id.clone());
        self.stages.push(spec);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no stage was added.
    pub fn build(self) -> Result<Pipeline<T>, PipelineValidationError> {
        self.config.validate()?;

        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.config.name
            )));
        }

        Ok(Pipeline::new(self.config, self.stages, self.events))
    }
}

impl<T: Send + 'static> std::fmt::Debug for PipelineBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::testing::{DoubleTransform, SumTransform};

    #[test]
    fn test_build_canonical_pipeline() {
        let pipeline = PipelineBuilder::<i64>::new("abc")
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .producer("B", Arc::new(DoubleTransform))
            .unwrap()
            .stage("C", Arc::new(SumTransform), &["A", "B"])
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "abc");
        assert_eq!(pipeline.sink_id().as_str(), "C");
        let ids: Vec<_> = pipeline.stage_ids().map(StageId::as_str).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_unknown_upstream_rejected() {
        let err = PipelineBuilder::<i64>::new("abc")
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .stage("C", Arc::new(SumTransform), &["A", "B"])
            .unwrap_err();

        assert!(err.message.contains("unknown stage 'B'"));
        assert_eq!(err.stages, vec!["C".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = PipelineBuilder::<i64>::new("abc")
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .producer("A", Arc::new(DoubleTransform))
            .unwrap_err();

        assert!(err.message.contains("more than once"));
    }

    #[test]
    fn test_stage_without_upstreams_rejected() {
        let result = PipelineBuilder::<i64>::new("abc").stage("C", Arc::new(SumTransform), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_error_converts_to_pipeline_error() {
        fn build_empty() -> Result<Pipeline<i64>, PipelineError> {
            let pipeline = PipelineBuilder::new("abc").build()?;
            Ok(pipeline)
        }

        let err = build_empty().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.to_string().contains("has no stages"));
        assert_eq!(err.stage_id(), None);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert!(PipelineBuilder::<i64>::new("abc").build().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PipelineBuilder::<i64>::new("  ")
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .build();
        assert!(result.is_err());

        let result = PipelineBuilder::<i64>::new("abc")
            .timeout(Duration::ZERO)
            .producer("A", Arc::new(DoubleTransform))
            .unwrap()
            .build();
        assert!(result.is_err());
    }
}
