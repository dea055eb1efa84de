//! Core types for sensor data.
//!
//! This module provides the fundamental types used throughout the sitewatch-metrics crate:
//! - [`SensorReading`]: A single measurement from a building sensor
//! - [`ReadingQuality`]: The quality flag a sensor attaches to a reading
//! - [`MetricSelector`]: Which readings a condition looks at
//! - [`AggregationFunction`] and [`TimeAggregation`]: How readings reduce to one value
//! - [`EvaluationWindow`]: The closed time interval an aggregation covers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Quality flag reported alongside a sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingQuality {
    /// The reading is trustworthy.
    #[default]
    Good,
    /// The sensor flagged the reading as suspect.
    Warning,
    /// The sensor reported an error for this reading.
    Error,
}

impl ReadingQuality {
    /// Returns the quality as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ReadingQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// The sensor that produced the reading.
    pub sensor_id: String,
    /// The metric type, when the sensor reports it (e.g. `energy_consumption`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
    /// The measured value.
    pub value: f64,
    /// Unit of the value (e.g. `kWh`, `people`).
    #[serde(default)]
    pub unit: String,
    /// Quality flag.
    #[serde(default)]
    pub quality: ReadingQuality,
}

impl SensorReading {
    /// Creates a good-quality reading.
    #[must_use]
    pub fn new(
        sensor_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            metric_type: None,
            timestamp,
            value,
            unit: unit.into(),
            quality: ReadingQuality::Good,
        }
    }

    /// Sets the metric type.
    #[must_use]
    pub fn with_metric_type(mut self, metric_type: impl Into<String>) -> Self {
        self.metric_type = Some(metric_type.into());
        self
    }

    /// Sets the quality flag.
    #[must_use]
    pub const fn with_quality(mut self, quality: ReadingQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Checks that the value is a finite number.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidReading` for NaN or infinite values.
    pub fn validate(&self) -> Result<()> {
        if self.value.is_finite() {
            Ok(())
        } else {
            Err(MetricsError::InvalidReading {
                sensor_id: self.sensor_id.clone(),
                reason: format!("value {} is not finite", self.value),
            })
        }
    }
}

/// Selects the readings a condition evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricSelector {
    /// The metric type (e.g. `energy_consumption`, `occupancy`).
    #[serde(rename = "type")]
    pub metric_type: String,
    /// Restrict to a single sensor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    /// Expected unit of the readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl MetricSelector {
    /// Maximum allowed length for a metric type.
    pub const MAX_TYPE_LENGTH: usize = 128;

    /// Creates a selector for a metric type.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidSelector` if the type is empty or too long.
    pub fn new(metric_type: impl Into<String>) -> Result<Self> {
        let metric_type = metric_type.into();
        if metric_type.trim().is_empty() {
            return Err(MetricsError::InvalidSelector {
                reason: "metric type cannot be empty".to_string(),
            });
        }
        if metric_type.len() > Self::MAX_TYPE_LENGTH {
            return Err(MetricsError::InvalidSelector {
                reason: format!(
                    "metric type exceeds maximum length of {} characters",
                    Self::MAX_TYPE_LENGTH
                ),
            });
        }

        Ok(Self {
            metric_type,
            sensor_id: None,
            units: None,
        })
    }

    /// Restricts the selector to one sensor.
    #[must_use]
    pub fn with_sensor(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    /// Sets the expected unit.
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Returns true if the reading belongs to this selector.
    ///
    /// A reading that carries a metric type must match it exactly. A reading
    /// without one is attributed through the sensor id, or failing that the unit.
    #[must_use]
    pub fn matches(&self, reading: &SensorReading) -> bool {
        if let Some(sensor_id) = &self.sensor_id {
            if reading.sensor_id != *sensor_id {
                return false;
            }
        }

        match &reading.metric_type {
            Some(metric_type) => *metric_type == self.metric_type,
            None if self.sensor_id.is_some() => true,
            None => self
                .units
                .as_ref()
                .is_some_and(|units| units.eq_ignore_ascii_case(&reading.unit)),
        }
    }
}

impl std::fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sensor_id {
            Some(sensor_id) => write!(f, "{}[{}]", self.metric_type, sensor_id),
            None => write!(f, "{}", self.metric_type),
        }
    }
}

/// Aggregation functions applied over a window of readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationFunction {
    /// Sum of all values.
    Sum,
    /// Average (mean) of all values.
    Average,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Number of readings.
    Count,
    /// Most recent value.
    Last,
}

impl AggregationFunction {
    /// Returns the function as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Last => "last",
        }
    }

    /// Applies this aggregation to values ordered oldest first.
    ///
    /// Returns `None` if the slice is empty.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        match self {
            Self::Sum => Some(values.iter().sum()),
            Self::Average => Some(values.iter().sum::<f64>() / values.len() as f64),
            Self::Min => values.iter().copied().reduce(f64::min),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Count => Some(values.len() as f64),
            Self::Last => values.last().copied(),
        }
    }
}

impl std::fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a condition reduces its readings to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeAggregation {
    /// The aggregation function.
    pub function: AggregationFunction,
    /// Length of the look-back window in minutes.
    pub period_minutes: u32,
    /// Minimum number of readings needed for the condition to be evaluable.
    #[serde(default)]
    pub minimum_data_points: usize,
}

impl TimeAggregation {
    /// Longest supported window (31 days).
    pub const MAX_PERIOD_MINUTES: u32 = 31 * 24 * 60;

    /// Creates a time aggregation.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidWindow` if the period is zero or longer
    /// than [`Self::MAX_PERIOD_MINUTES`].
    pub fn new(
        function: AggregationFunction,
        period_minutes: u32,
        minimum_data_points: usize,
    ) -> Result<Self> {
        let aggregation = Self {
            function,
            period_minutes,
            minimum_data_points,
        };
        aggregation.validate()?;
        Ok(aggregation)
    }

    /// Validates the window bounds.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidWindow` if the period is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.period_minutes == 0 {
            return Err(MetricsError::InvalidWindow {
                reason: "period must be at least one minute".to_string(),
            });
        }
        if self.period_minutes > Self::MAX_PERIOD_MINUTES {
            return Err(MetricsError::InvalidWindow {
                reason: format!(
                    "period exceeds maximum of {} minutes",
                    Self::MAX_PERIOD_MINUTES
                ),
            });
        }
        Ok(())
    }

    /// Returns the window ending at `now`.
    #[must_use]
    pub fn window_ending_at(&self, now: DateTime<Utc>) -> EvaluationWindow {
        EvaluationWindow {
            start: now - Duration::minutes(i64::from(self.period_minutes)),
            end: now,
        }
    }
}

/// A closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (inclusive).
    pub end: DateTime<Utc>,
}

impl EvaluationWindow {
    /// Checks if a timestamp falls within this window (inclusive).
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Returns the window length in whole minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}
