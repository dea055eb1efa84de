//! Condition evaluation.
//!
//! A condition is met when its aggregate compares true against the threshold.
//! A condition without enough data is reported as not evaluable and never met.

use std::fmt;
use std::sync::Arc;

use sitewatch_metrics::{aggregate, select_window, Aggregated, MetricSelector, SensorReading};
use tracing::{debug, trace};

use crate::alert::MetricValueResult;
use crate::config::EngineConfig;
use crate::schedule::BusinessHours;
use crate::types::{ComparisonOperator, Condition, EvaluationContext};

/// Factor reported when the evaluation instant is inside business hours.
pub const FACTOR_BUSINESS_HOURS: &str = "Business hours";
/// Factor reported when the evaluation instant is outside business hours.
pub const FACTOR_AFTER_HOURS: &str = "After hours";
/// Factor reported on Saturdays and Sundays.
pub const FACTOR_WEEKEND: &str = "Weekend";
/// Factor reported when the outdoor temperature is high.
pub const FACTOR_HIGH_TEMPERATURE: &str = "High temperature";
/// Factor reported when the building is nearly full.
pub const FACTOR_HIGH_OCCUPANCY: &str = "High occupancy";
/// Factor reported when equipment faults are active.
pub const FACTOR_EQUIPMENT_FAULTS: &str = "Equipment faults reported";

/// Supplies confidence scores for `anomaly_detected` conditions.
pub trait AnomalyClassifier: Send + Sync + fmt::Debug {
    /// Returns a confidence in `[0, 1]` that `window` is anomalous given
    /// `historical`, or `None` if no judgement can be made.
    fn confidence(
        &self,
        metric: &MetricSelector,
        window: &[&SensorReading],
        historical: &[SensorReading],
    ) -> Option<f64>;
}

/// Derives the human-readable annotations for an evaluation.
///
/// Factors describe the situation only and never affect triggering.
#[must_use]
pub fn contributing_factors(
    context: &EvaluationContext,
    business_hours: &BusinessHours,
    config: &EngineConfig,
) -> Vec<String> {
    let mut factors = Vec::new();
    let now = context.current_time;

    match business_hours.contains(now) {
        Ok(true) => factors.push(FACTOR_BUSINESS_HOURS.to_string()),
        Ok(false) => factors.push(FACTOR_AFTER_HOURS.to_string()),
        Err(e) => debug!(error = %e, "skipping time-of-day factor"),
    }
    if business_hours.is_weekend(now).unwrap_or(false) {
        factors.push(FACTOR_WEEKEND.to_string());
    }

    if context
        .weather_data
        .as_ref()
        .is_some_and(|w| w.temperature_c > config.high_temperature_threshold_c)
    {
        factors.push(FACTOR_HIGH_TEMPERATURE.to_string());
    }

    if context
        .occupancy_data
        .as_ref()
        .and_then(crate::types::OccupancyData::ratio)
        .is_some_and(|ratio| ratio > config.high_occupancy_ratio)
    {
        factors.push(FACTOR_HIGH_OCCUPANCY.to_string());
    }

    if context
        .system_status
        .as_ref()
        .is_some_and(|s| !s.active_faults.is_empty())
    {
        factors.push(FACTOR_EQUIPMENT_FAULTS.to_string());
    }

    factors
}

/// Evaluates single conditions against a context.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    classifier: Option<Arc<dyn AnomalyClassifier>>,
}

impl ConditionEvaluator {
    /// Creates an evaluator without an anomaly classifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the anomaly classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn AnomalyClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Evaluates `condition` at `context.current_time`.
    ///
    /// `factors` are attached to the result unchanged.
    #[must_use]
    pub fn evaluate(
        &self,
        condition: &Condition,
        context: &EvaluationContext,
        factors: &[String],
    ) -> MetricValueResult {
        let aggregated = aggregate(
            &context.sensor_readings,
            &condition.metric,
            &condition.filters,
            &condition.time_aggregation,
            context.current_time,
        );
        let window = aggregated.window();
        let data_points = aggregated.data_points();
        let value = aggregated.value().map(|v| v.value);

        let (evaluable, met, anomaly_confidence) = match condition.operator {
            ComparisonOperator::AnomalyDetected => {
                let confidence = self.anomaly_confidence(condition, context, &aggregated);
                let level = condition.threshold.confidence_level_or_default();
                let met = confidence.is_some_and(|c| condition.operator.evaluate(c, level));
                (confidence.is_some(), met, confidence)
            }
            op => {
                let met = value.is_some_and(|v| op.evaluate(v, condition.threshold.value));
                (value.is_some(), met, None)
            }
        };

        trace!(
            condition_id = %condition.id,
            condition = %condition,
            ?value,
            data_points,
            met,
            "condition evaluated"
        );

        MetricValueResult {
            condition_id: condition.id.clone(),
            metric_type: condition.metric.metric_type.clone(),
            value,
            threshold: condition.threshold.value,
            operator: condition.operator,
            met,
            evaluable,
            data_points,
            anomaly_confidence,
            evaluation_window: window,
            contributing_factors: factors.to_vec(),
        }
    }

    fn anomaly_confidence(
        &self,
        condition: &Condition,
        context: &EvaluationContext,
        aggregated: &Aggregated,
    ) -> Option<f64> {
        let Some(classifier) = &self.classifier else {
            debug!(condition_id = %condition.id, "no anomaly classifier configured");
            return None;
        };
        aggregated.value()?;

        let window = select_window(
            &context.sensor_readings,
            &condition.metric,
            &condition.filters,
            &aggregated.window(),
        );
        classifier
            .confidence(&condition.metric, &window, &context.historical_data)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
    }
}
