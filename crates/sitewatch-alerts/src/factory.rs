//! Builds alert instances for fired rules.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use sitewatch_metrics::{select_window, SensorReading};
use uuid::Uuid;

use crate::alert::{AlertContext, AlertInstance, AlertStatus};
use crate::error::Result;
use crate::rule::RuleOutcome;
use crate::store::AlertStore;
use crate::types::{AlertConfiguration, AlertRule, EvaluationContext};

/// Creates [`AlertInstance`]s from rule outcomes.
#[derive(Debug, Clone)]
pub struct AlertFactory {
    store: Arc<dyn AlertStore>,
    related_lookback: Duration,
}

impl AlertFactory {
    /// Creates a factory that links alerts raised within `related_lookback_minutes`.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, related_lookback_minutes: u32) -> Self {
        Self {
            store,
            related_lookback: Duration::minutes(i64::from(related_lookback_minutes)),
        }
    }

    /// Builds the alert for a fired rule.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if related alerts cannot be read.
    pub fn build(
        &self,
        configuration: &AlertConfiguration,
        rule: &AlertRule,
        outcome: RuleOutcome,
        context: &EvaluationContext,
    ) -> Result<AlertInstance> {
        let related_alerts = self
            .store
            .recent_alerts(
                &configuration.id,
                None,
                context.current_time - self.related_lookback,
            )?
            .into_iter()
            .map(|a| a.id)
            .collect();

        Ok(AlertInstance {
            id: Uuid::new_v4().to_string(),
            configuration_id: configuration.id.clone(),
            rule_id: rule.id.clone(),
            title: configuration.name.clone(),
            description: describe(rule, &outcome),
            status: AlertStatus::Triggered,
            severity: outcome.severity,
            confidence: outcome.confidence,
            context: AlertContext {
                weather: context.weather_data.clone(),
                occupancy: context.occupancy_data.clone(),
                system_status: context.system_status.clone(),
                sensor_data: contributing_readings(rule, context),
                related_alerts,
            },
            metric_values: outcome.metric_values,
            escalation_level: 0,
            suppressed: outcome.suppressed,
            notification_log: Vec::new(),
            triggered_at: context.current_time,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolution_notes: None,
        })
    }
}

fn describe(rule: &AlertRule, outcome: &RuleOutcome) -> String {
    if !rule.description.trim().is_empty() {
        return rule.description.clone();
    }
    let met: Vec<String> = rule
        .conditions
        .iter()
        .zip(&outcome.metric_values)
        .filter(|(_, result)| result.met)
        .map(|(condition, result)| match result.value {
            Some(value) => format!("{condition} (observed {value:.2})"),
            None => condition.to_string(),
        })
        .collect();
    format!("{}: {}", rule.name, met.join(", "))
}

/// Readings that fed the rule's conditions, oldest first, without repeats.
fn contributing_readings(rule: &AlertRule, context: &EvaluationContext) -> Vec<SensorReading> {
    let mut seen = HashSet::new();
    let mut readings: Vec<SensorReading> = rule
        .conditions
        .iter()
        .flat_map(|condition| {
            let window = condition.time_aggregation.window_ending_at(context.current_time);
            select_window(
                &context.sensor_readings,
                &condition.metric,
                &condition.filters,
                &window,
            )
        })
        .filter(|r| seen.insert((r.sensor_id.clone(), r.timestamp)))
        .cloned()
        .collect();
    readings.sort_by_key(|r| r.timestamp);
    readings
}
