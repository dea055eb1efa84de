//! Error types for the sitewatch-alerts crate.

use thiserror::Error;

/// Errors that can occur in the alerting system.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Invalid alert rule or configuration.
    #[error("invalid alert configuration: {reason}")]
    InvalidConfiguration {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// Alert with the given ID was not found.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The alert ID that was not found.
        id: String,
    },

    /// An alert lifecycle transition is not allowed from the current state.
    #[error("invalid alert transition for {id}: {reason}")]
    InvalidTransition {
        /// The alert ID.
        id: String,
        /// Why the transition was refused.
        reason: String,
    },

    /// A notification log append would break chronological order.
    #[error("notification log out of order for alert {alert_id}: {reason}")]
    LogOrdering {
        /// The alert whose log was being appended.
        alert_id: String,
        /// Details about the offending entry.
        reason: String,
    },

    /// Notification delivery failed.
    #[error("notification failed: {reason}")]
    NotificationFailed {
        /// The reason the notification failed.
        reason: String,
    },

    /// Notification delivery timed out.
    #[error("notification timed out after {timeout_ms}ms")]
    DeliveryTimeout {
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// Failed to evaluate a rule or condition.
    #[error("evaluation failed: {reason}")]
    EvaluationError {
        /// The reason the evaluation failed.
        reason: String,
    },

    /// An IANA timezone name could not be resolved.
    #[error("unknown timezone: {name}")]
    InvalidTimezone {
        /// The timezone name as configured.
        name: String,
    },

    /// The alert store rejected an operation.
    #[error("alert store error: {reason}")]
    StoreError {
        /// The reason the store failed.
        reason: String,
    },

    /// Metric selection or aggregation input was invalid.
    #[error("metrics error: {0}")]
    MetricsError(#[from] sitewatch_metrics::MetricsError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Invalid engine or delivery configuration file.
    #[error("invalid settings: {reason}")]
    InvalidSettings {
        /// The reason the settings are invalid.
        reason: String,
    },
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;
