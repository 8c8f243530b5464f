//! Stage specifications.

use crate::errors::PipelineValidationError;
use crate::stages::{StageId, Transform};
use std::collections::HashSet;
use std::sync::Arc;

/// Specification for a single stage in a pipeline.
pub struct StageSpec<T: Send + 'static> {
    /// The unique id of the stage.
    pub id: StageId,
    /// The stage's computation.
    pub transform: Arc<dyn Transform<T>>,
    /// Stages whose values this stage consumes. Empty for producers.
    pub upstreams: Vec<StageId>,
}

impl<T: Send + 'static> StageSpec<T> {
    /// Creates a producer stage, fed by a caller-supplied seed input.
    #[must_use]
    pub fn producer(id: impl Into<StageId>, transform: Arc<dyn Transform<T>>) -> Self {
        Self {
            id: id.into(),
            transform,
            upstreams: Vec::new(),
        }
    }

    /// Creates a dependent stage fed by the values of `upstreams`.
    #[must_use]
    pub fn dependent(
        id: impl Into<StageId>,
        transform: Arc<dyn Transform<T>>,
        upstreams: impl IntoIterator<Item = impl Into<StageId>>,
    ) -> Self {
        Self {
            id: id.into(),
            transform,
            upstreams: upstreams.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the stage takes a seed input rather than upstream values.
    #[must_use]
    pub fn is_producer(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// Validates the stage specification in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage depends on itself or lists an upstream twice.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(PipelineValidationError::new("Stage id cannot be empty"));
        }
        if self.upstreams.contains(&self.id) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.id
            ))
            .with_stages(vec![self.id.to_string()]));
        }
        let mut seen = HashSet::new();
        for upstream in &self.upstreams {
            if !seen.insert(upstream) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' lists upstream '{}' more than once",
                    self.id, upstream
                ))
                .with_stages(vec![self.id.to_string(), upstream.to_string()]));
            }
        }
        Ok(())
    }
}

impl<T: Send + 'static> Clone for StageSpec<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            transform: self.transform.clone(),
            upstreams: self.upstreams.clone(),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for StageSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("id", &self.id)
            .field("transform", &self.transform)
            .field("upstreams", &self.upstreams)
            .finish()
    }
}
