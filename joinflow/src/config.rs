//! Construction-time configuration of a pipeline.

use crate::errors::PipelineValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings shared by every run of a pipeline.
///
/// Deserializes from JSON such as `{"name": "abc", "timeout_ms": 50}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The pipeline name, used in logs and events.
    pub name: String,
    /// Deadline of each run, measured from run creation.
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl PipelineConfig {
    /// Creates a configuration with the default timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the run timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            PipelineValidationError::new(format!("Invalid pipeline configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the timeout is zero.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }
        if self.timeout.is_zero() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' must have a non-zero timeout",
                self.name
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
