//! Metric registry error types.

use thiserror::Error;

/// Errors that can occur when registering or writing metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric with this name already exists in the group.
    #[error("metric '{group}/{name}' is already registered")]
    Duplicate { group: String, name: String },

    /// Label values do not match the declared label names.
    #[error("metric '{name}' expects {expected} label values, got {actual}")]
    LabelArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Error from the prometheus backend.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
