//! Error taxonomy for pipeline runs

use serde::Serialize;

/// Errors that end a single pipeline run
///
/// Per-resource problems never surface here; they are recorded as
/// [`EvaluationFailure`]s on the run report instead.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("pipeline {pipeline}: fetching resources failed: {source}")]
    Fetch {
        pipeline: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline {pipeline}: writing report failed: {source}")]
    Sink {
        pipeline: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline {pipeline}: sort column '{column}' is not part of the report header")]
    Schema { pipeline: String, column: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    pub fn pipeline(&self) -> Option<&str> {
        match self {
            ScanError::Fetch { pipeline, .. }
            | ScanError::Sink { pipeline, .. }
            | ScanError::Schema { pipeline, .. } => Some(pipeline),
            ScanError::Config(_) => None,
        }
    }
}

/// A resource whose evaluation errored, panicked or timed out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFailure {
    pub resource_id: String,
    pub reason: String,
}

impl EvaluationFailure {
    pub fn new(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = ScanError::Fetch {
            pipeline: "ebs-unused".to_string(),
            source: anyhow::anyhow!("throttled"),
        };
        assert_eq!(
            err.to_string(),
            "pipeline ebs-unused: fetching resources failed: throttled"
        );
        assert_eq!(err.pipeline(), Some("ebs-unused"));
    }

    #[test]
    fn test_config_error_has_no_pipeline() {
        let err = ScanError::Config("max_workers must be positive".to_string());
        assert!(err.pipeline().is_none());
    }
}
