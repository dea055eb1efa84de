//! Error types for the sitewatch-metrics crate.

use thiserror::Error;

/// Errors that can occur when building metric selectors, filters or aggregations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The metric selector is invalid (empty type or sensor id).
    #[error("invalid metric selector: {reason}")]
    InvalidSelector {
        /// The reason the selector is invalid.
        reason: String,
    },

    /// The aggregation window is invalid.
    #[error("invalid aggregation window: {reason}")]
    InvalidWindow {
        /// The reason the window is invalid.
        reason: String,
    },

    /// A reading filter is malformed.
    #[error("invalid reading filter on '{field}': {reason}")]
    InvalidFilter {
        /// The field the filter applies to.
        field: String,
        /// The reason the filter is invalid.
        reason: String,
    },

    /// A sensor reading carries a non-finite value.
    #[error("invalid reading from sensor {sensor_id}: {reason}")]
    InvalidReading {
        /// The sensor that produced the reading.
        sensor_id: String,
        /// The reason the reading is invalid.
        reason: String,
    },
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
