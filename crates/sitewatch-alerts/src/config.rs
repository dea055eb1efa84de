//! Engine and delivery tuning.
//!
//! Loaded from TOML with every section optional:
//!
//! ```toml
//! [engine]
//! confidence_sensitivity = 10.0
//! high_temperature_threshold_c = 30.0
//!
//! [delivery]
//! default_timeout_ms = 10000
//! webhook_timeout_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::schedule::{parse_timezone, BusinessHours};

/// Tuning for rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How fast per-condition confidence saturates with relative deviation.
    pub confidence_sensitivity: f64,
    /// Outdoor temperature above which "High temperature" is reported.
    pub high_temperature_threshold_c: f64,
    /// Occupancy ratio above which "High occupancy" is reported.
    pub high_occupancy_ratio: f64,
    /// Look-back for `related_alerts`, in minutes.
    pub related_alert_lookback_minutes: u32,
    /// Business hours used when a configuration declares none.
    pub default_business_hours: BusinessHours,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_sensitivity: 10.0,
            high_temperature_threshold_c: 30.0,
            high_occupancy_ratio: 0.8,
            related_alert_lookback_minutes: 24 * 60,
            default_business_hours: BusinessHours::default(),
        }
    }
}

/// Tuning for notification delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Bound on every channel send.
    pub default_timeout_ms: u64,
    /// Webhook bound when the channel sets none.
    pub webhook_timeout_ms: u64,
    /// SMS length when the channel sets none.
    pub sms_max_length: usize,
    /// Sender address when the email channel sets none.
    pub email_from: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            webhook_timeout_ms: 5_000,
            sms_max_length: 160,
            email_from: "alerts@sitewatch.local".to_string(),
        }
    }
}

impl DeliveryConfig {
    /// Returns the default send bound.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Top-level alerting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlertingConfig {
    /// Evaluation tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Delivery tuning.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl AlertingConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AlertError::InvalidSettings {
                reason: format!(
                    "failed to read config file '{}': {e}",
                    path.as_ref().display()
                ),
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| AlertError::InvalidSettings {
            reason: format!("invalid TOML: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidSettings` if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if !engine.confidence_sensitivity.is_finite() || engine.confidence_sensitivity <= 0.0 {
            return Err(invalid("engine.confidence_sensitivity must be positive"));
        }
        if !engine.high_temperature_threshold_c.is_finite() {
            return Err(invalid("engine.high_temperature_threshold_c must be finite"));
        }
        if !(engine.high_occupancy_ratio > 0.0 && engine.high_occupancy_ratio <= 1.0) {
            return Err(invalid("engine.high_occupancy_ratio must be in (0, 1]"));
        }
        parse_timezone(&engine.default_business_hours.timezone).map_err(|_| {
            invalid(&format!(
                "engine.default_business_hours.timezone '{}' is unknown",
                engine.default_business_hours.timezone
            ))
        })?;

        let delivery = &self.delivery;
        if delivery.default_timeout_ms == 0 {
            return Err(invalid("delivery.default_timeout_ms must be greater than 0"));
        }
        if delivery.webhook_timeout_ms == 0 {
            return Err(invalid("delivery.webhook_timeout_ms must be greater than 0"));
        }
        if delivery.sms_max_length == 0 {
            return Err(invalid("delivery.sms_max_length must be greater than 0"));
        }
        if !delivery.email_from.contains('@') {
            return Err(invalid("delivery.email_from must be an email address"));
        }

        Ok(())
    }
}

fn invalid(reason: &str) -> AlertError {
    AlertError::InvalidSettings {
        reason: reason.to_string(),
    }
}
