//! Sensor readings and time-window aggregation for sitewatch.
//!
//! `sitewatch-metrics` turns raw building-sensor readings into the single
//! values that alert conditions compare against thresholds.
//!
//! # Features
//!
//! - **Selection**: Pick readings by metric type, sensor id or unit
//! - **Filtering**: Drop readings by quality, value, unit or sensor before aggregating
//! - **Windowing**: Keep only readings inside `[now - period, now]`
//! - **Aggregation**: Sum, average, min, max, count or last value
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use sitewatch_metrics::{
//!     aggregate, AggregationFunction, MetricSelector, ReadingField, ReadingFilter,
//!     SensorReading, TimeAggregation,
//! };
//!
//! let now = Utc::now();
//! let readings: Vec<SensorReading> = (0..12)
//!     .map(|i| SensorReading::new("meter-1", now - Duration::minutes(i * 5), 130.0, "kWh"))
//!     .collect();
//!
//! let selector = MetricSelector::new("energy_consumption").unwrap().with_sensor("meter-1");
//! let filters = vec![ReadingFilter::equals(ReadingField::Quality, "good").unwrap()];
//! let aggregation = TimeAggregation::new(AggregationFunction::Sum, 60, 12).unwrap();
//!
//! let result = aggregate(&readings, &selector, &filters, &aggregation, now);
//! assert_eq!(result.value().map(|v| v.data_points), Some(12));
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/sitewatch-metrics/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregate;
pub mod error;
pub mod filter;
pub mod types;

// Re-export main types at crate root
pub use aggregate::{aggregate, approx_eq, select_window, AggregateValue, Aggregated};
pub use error::{MetricsError, Result};
pub use filter::{FilterOperator, FilterValue, ReadingField, ReadingFilter};
pub use types::{
    AggregationFunction, EvaluationWindow, MetricSelector, ReadingQuality, SensorReading,
    TimeAggregation,
};
