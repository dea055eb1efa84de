//! Rule evaluation: combine conditions, pick severity, score confidence.
//!
//! # Confidence
//!
//! Each met condition contributes a score `s` in `[0.5, 1]`:
//!
//! ```text
//! d = |value - threshold| / max(|threshold|, 1e-9)
//! s = 0.5 + 0.5 * (1 - exp(-k * d))
//! ```
//!
//! where `k` is [`EngineConfig::confidence_sensitivity`]. Anomaly conditions
//! use the classifier confidence as `s`. Scores combine as
//! `1 - prod(1 - s)`, so larger deviations and more met conditions never lower
//! confidence.

use tracing::debug;

use crate::alert::MetricValueResult;
use crate::condition::{contributing_factors, ConditionEvaluator};
use crate::config::EngineConfig;
use crate::types::{
    AlertConfiguration, AlertRule, AlertSeverity, ComparisonOperator, EvaluationContext,
    ImpactLevel, LogicalOperator,
};

const MIN_THRESHOLD_SCALE: f64 = 1e-9;

/// The outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// The rule evaluated.
    pub rule_id: String,
    /// Whether the rule fired.
    pub fired: bool,
    /// Severity the alert would carry.
    pub severity: AlertSeverity,
    /// Confidence in `[0, 1]`; zero when not fired.
    pub confidence: f64,
    /// Held back by an active maintenance window.
    pub suppressed: bool,
    /// One result per condition, in rule order.
    pub metric_values: Vec<MetricValueResult>,
}

/// Scores one met condition.
#[must_use]
pub fn condition_score(result: &MetricValueResult, sensitivity: f64) -> f64 {
    if result.operator == ComparisonOperator::AnomalyDetected {
        return result.anomaly_confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    }
    let Some(value) = result.value else {
        return 0.0;
    };
    let deviation = (value - result.threshold).abs() / result.threshold.abs().max(MIN_THRESHOLD_SCALE);
    let score = 0.5 + 0.5 * (1.0 - (-sensitivity * deviation).exp());
    if score.is_finite() { score.clamp(0.5, 1.0) } else { 1.0 }
}

/// Combines the scores of the met conditions.
#[must_use]
pub fn combine_confidence(results: &[MetricValueResult], sensitivity: f64) -> f64 {
    let miss: f64 = results
        .iter()
        .filter(|r| r.met)
        .map(|r| 1.0 - condition_score(r, sensitivity))
        .product();
    let met_any = results.iter().any(|r| r.met);
    if met_any { (1.0 - miss).clamp(0.0, 1.0) } else { 0.0 }
}

/// Returns true if the results satisfy the logical operator.
#[must_use]
pub fn combine(operator: LogicalOperator, results: &[MetricValueResult]) -> bool {
    if results.is_empty() {
        return false;
    }
    match operator {
        LogicalOperator::And => results.iter().all(|r| r.evaluable && r.met),
        LogicalOperator::Or => results.iter().any(|r| r.met),
    }
}

/// Returns the severity of a fired rule within its configuration.
#[must_use]
pub fn effective_severity(configuration: &AlertConfiguration, rule: &AlertRule) -> AlertSeverity {
    let metadata = &configuration.metadata;
    if metadata.severity_auto_adjust && metadata.business_impact.level >= ImpactLevel::High {
        rule.priority.escalated()
    } else {
        rule.priority
    }
}

/// Evaluates rules of a configuration against a context.
#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    conditions: ConditionEvaluator,
    config: EngineConfig,
}

impl RuleEvaluator {
    /// Creates a rule evaluator.
    #[must_use]
    pub const fn new(conditions: ConditionEvaluator, config: EngineConfig) -> Self {
        Self { conditions, config }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates one rule.
    #[must_use]
    pub fn evaluate(
        &self,
        configuration: &AlertConfiguration,
        rule: &AlertRule,
        context: &EvaluationContext,
    ) -> RuleOutcome {
        let business_hours = configuration
            .metadata
            .business_hours
            .as_ref()
            .unwrap_or(&self.config.default_business_hours);
        let factors = contributing_factors(context, business_hours, &self.config);

        let metric_values: Vec<MetricValueResult> = rule
            .conditions
            .iter()
            .map(|c| self.conditions.evaluate(c, context, &factors))
            .collect();

        let fired = !context.has_no_readings() && combine(rule.logical_operator, &metric_values);
        let severity = effective_severity(configuration, rule);
        let confidence = if fired {
            combine_confidence(&metric_values, self.config.confidence_sensitivity)
        } else {
            0.0
        };
        let suppressed = fired
            && severity != AlertSeverity::Critical
            && configuration
                .metadata
                .maintenance_suppression
                .as_ref()
                .is_some_and(|w| w.is_active_at(context.current_time));

        debug!(
            configuration_id = %configuration.id,
            rule_id = %rule.id,
            fired,
            severity = %severity,
            confidence,
            suppressed,
            "rule evaluated"
        );

        RuleOutcome {
            rule_id: rule.id.clone(),
            fired,
            severity,
            confidence,
            suppressed,
            metric_values,
        }
    }
}
