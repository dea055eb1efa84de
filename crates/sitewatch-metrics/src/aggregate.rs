//! Window aggregation of sensor readings.
//!
//! [`aggregate`] is the single entry point: select the readings a condition
//! cares about, drop the ones its filters reject, keep those inside
//! `[now - period, now]`, and reduce them with the aggregation function.
//! Fewer readings than the required minimum means "not evaluable", which the
//! caller treats as "not met".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::filter::{passes_all, ReadingFilter};
use crate::types::{EvaluationWindow, MetricSelector, SensorReading, TimeAggregation};

/// The result of aggregating a window of readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateValue {
    /// The aggregated value.
    pub value: f64,
    /// How many readings contributed.
    pub data_points: usize,
    /// The window that was aggregated.
    pub window: EvaluationWindow,
}

/// Outcome of an aggregation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregated {
    /// Enough readings were present.
    Value(AggregateValue),
    /// Too few readings survived selection, filtering and windowing.
    NotEvaluable {
        /// Readings that survived.
        data_points: usize,
        /// Readings required.
        required: usize,
        /// The window that was examined.
        window: EvaluationWindow,
    },
}

impl Aggregated {
    /// Returns the aggregate if the condition was evaluable.
    #[must_use]
    pub const fn value(&self) -> Option<&AggregateValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotEvaluable { .. } => None,
        }
    }

    /// Returns the examined window.
    #[must_use]
    pub const fn window(&self) -> EvaluationWindow {
        match self {
            Self::Value(v) => v.window,
            Self::NotEvaluable { window, .. } => *window,
        }
    }

    /// Returns how many readings contributed.
    #[must_use]
    pub const fn data_points(&self) -> usize {
        match self {
            Self::Value(v) => v.data_points,
            Self::NotEvaluable { data_points, .. } => *data_points,
        }
    }
}

/// Relative tolerance used when comparing aggregated values for equality.
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Compares two values for equality within [`EQUALITY_TOLERANCE`], scaled by
/// the larger magnitude (and never below an absolute `1e-9`).
#[must_use]
pub fn approx_eq(left: f64, right: f64) -> bool {
    (left - right).abs() <= EQUALITY_TOLERANCE * left.abs().max(right.abs()).max(1.0)
}

/// Returns the readings that belong to the selector, pass the filters and
/// fall inside the window, ordered oldest first.
#[must_use]
pub fn select_window<'a>(
    readings: &'a [SensorReading],
    selector: &MetricSelector,
    filters: &[ReadingFilter],
    window: &EvaluationWindow,
) -> Vec<&'a SensorReading> {
    let mut selected: Vec<&SensorReading> = readings
        .iter()
        .filter(|r| selector.matches(r))
        .filter(|r| r.value.is_finite())
        .filter(|r| passes_all(filters, r))
        .filter(|r| window.contains(r.timestamp))
        .collect();

    selected.sort_by_key(|r| r.timestamp);
    selected
}

/// Aggregates the readings for one condition at `now`.
///
/// This is a pure function of its inputs.
#[must_use]
pub fn aggregate(
    readings: &[SensorReading],
    selector: &MetricSelector,
    filters: &[ReadingFilter],
    aggregation: &TimeAggregation,
    now: DateTime<Utc>,
) -> Aggregated {
    let window = aggregation.window_ending_at(now);
    let selected = select_window(readings, selector, filters, &window);
    let required = aggregation.minimum_data_points.max(1);

    if selected.len() < required {
        trace!(
            metric = %selector,
            data_points = selected.len(),
            required,
            "not enough readings to evaluate"
        );
        return Aggregated::NotEvaluable {
            data_points: selected.len(),
            required,
            window,
        };
    }

    let values: Vec<f64> = selected.iter().map(|r| r.value).collect();
    match aggregation.function.apply(&values) {
        Some(value) => Aggregated::Value(AggregateValue {
            value,
            data_points: values.len(),
            window,
        }),
        None => Aggregated::NotEvaluable {
            data_points: 0,
            required,
            window,
        },
    }
}
