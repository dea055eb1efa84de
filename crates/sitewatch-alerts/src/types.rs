//! Core configuration types for the alerting system.
//!
//! This module provides the user-managed side of the data model:
//! - [`AlertSeverity`]: Rule priority and alert severity
//! - [`ComparisonOperator`] and [`LogicalOperator`]: How conditions are checked and combined
//! - [`Condition`]: A single metric/operator/threshold check
//! - [`AlertRule`]: Conditions joined by AND/OR with priority and cooldown
//! - [`AlertConfiguration`]: The top-level object bundling rules, notification settings and escalation
//! - [`EvaluationContext`]: The readings and surroundings an evaluation pass sees

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitewatch_metrics::{approx_eq, MetricSelector, ReadingFilter, SensorReading, TimeAggregation};
use uuid::Uuid;

use crate::error::{AlertError, Result};
use crate::escalation::EscalationPolicy;
use crate::schedule::BusinessHours;
use crate::settings::NotificationSettings;

/// The severity of an alert, and the priority of the rule that raised it.
///
/// Ordered: `Info` < `Low` < `Medium` < `High` < `Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational, no action required.
    Info,
    /// Low urgency.
    Low,
    /// Should be investigated.
    #[default]
    Medium,
    /// Needs attention soon.
    High,
    /// Requires immediate attention.
    Critical,
}

impl AlertSeverity {
    /// All severities, lowest first.
    pub const ALL: [Self; 5] = [
        Self::Info,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
    ];

    /// Returns the severity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns the next severity up, saturating at `Critical`.
    #[must_use]
    pub const fn escalated(&self) -> Self {
        match self {
            Self::Info => Self::Low,
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationStatus {
    /// Being edited, not evaluated.
    #[default]
    Draft,
    /// Evaluated on every pass.
    Active,
    /// Temporarily not evaluated.
    Paused,
    /// Retired.
    Archived,
}

impl ConfigurationStatus {
    /// Returns true if configurations in this status are evaluated.
    #[must_use]
    pub const fn is_evaluated(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Comparison operators for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// Strictly greater (>). A value equal to the threshold does not match.
    GreaterThan,
    /// Greater or equal (>=).
    GreaterThanOrEqual,
    /// Strictly less (<).
    LessThan,
    /// Less or equal (<=).
    LessThanOrEqual,
    /// Equal within a relative tolerance of `1e-9`.
    Equals,
    /// Outside the `Equals` tolerance.
    NotEquals,
    /// Anomaly classifier confidence at or above the threshold confidence level.
    AnomalyDetected,
}

impl ComparisonOperator {
    /// Compares a value against a threshold.
    ///
    /// `AnomalyDetected` compares a classifier confidence against a confidence level.
    #[must_use]
    pub fn evaluate(&self, left: f64, right: f64) -> bool {
        match self {
            Self::GreaterThan => left > right,
            Self::GreaterThanOrEqual | Self::AnomalyDetected => left >= right,
            Self::LessThan => left < right,
            Self::LessThanOrEqual => left <= right,
            Self::Equals => approx_eq(left, right),
            Self::NotEquals => !approx_eq(left, right),
        }
    }

    /// Returns the operator as a symbol.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::AnomalyDetected => "~anomaly",
        }
    }

    /// Returns true for operators whose breach grows as the value falls.
    #[must_use]
    pub const fn is_lower_bound(&self) -> bool {
        matches!(self, Self::LessThan | Self::LessThanOrEqual)
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_symbol())
    }
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    /// Every condition must be evaluable and met.
    #[default]
    And,
    /// At least one condition must be met.
    Or,
}

/// The threshold a condition compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Numeric threshold.
    pub value: f64,
    /// Minimum classifier confidence for `anomaly_detected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
}

impl Threshold {
    /// Default confidence level for anomaly conditions.
    pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.8;

    /// Creates a numeric threshold.
    #[must_use]
    pub const fn value(value: f64) -> Self {
        Self {
            value,
            confidence_level: None,
        }
    }

    /// Returns the confidence level, or the default.
    #[must_use]
    pub fn confidence_level_or_default(&self) -> f64 {
        self.confidence_level
            .unwrap_or(Self::DEFAULT_CONFIDENCE_LEVEL)
    }
}

/// A single metric/operator/threshold check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Identifier, unique within the rule.
    pub id: String,
    /// Which readings to look at.
    pub metric: MetricSelector,
    /// The comparison.
    pub operator: ComparisonOperator,
    /// The threshold.
    pub threshold: Threshold,
    /// How readings reduce to one value.
    pub time_aggregation: TimeAggregation,
    /// Predicates applied to raw readings before aggregation.
    #[serde(default)]
    pub filters: Vec<ReadingFilter>,
}

impl Condition {
    /// Creates a condition without filters.
    #[must_use]
    pub fn new(
        metric: MetricSelector,
        operator: ComparisonOperator,
        threshold: f64,
        time_aggregation: TimeAggregation,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metric,
            operator,
            threshold: Threshold::value(threshold),
            time_aggregation,
            filters: Vec::new(),
        }
    }

    /// Sets the condition id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds a reading filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ReadingFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the anomaly confidence level.
    #[must_use]
    pub const fn with_confidence_level(mut self, level: f64) -> Self {
        self.threshold.confidence_level = Some(level);
        self
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) {} {}",
            self.time_aggregation.function, self.metric, self.operator, self.threshold.value
        )
    }
}

/// One or more conditions combined by AND/OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier for the rule.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description used in alert text.
    #[serde(default)]
    pub description: String,
    /// Whether this rule is evaluated.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Severity of alerts raised by this rule.
    pub priority: AlertSeverity,
    /// Conditions in evaluation order.
    pub conditions: Vec<Condition>,
    /// How the conditions combine.
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    /// Evaluation cadence hint, in minutes.
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window_minutes: u32,
    /// Minutes after a trigger during which duplicates are suppressed.
    #[serde(default)]
    pub cooldown_period_minutes: u32,
    /// Whether triggers inside the cooldown return the existing alert.
    #[serde(default = "default_enabled")]
    pub suppress_duplicates: bool,
}

const fn default_enabled() -> bool {
    true
}

const fn default_evaluation_window() -> u32 {
    5
}

impl AlertRule {
    /// Maximum allowed length for rule names.
    pub const MAX_NAME_LENGTH: usize = 256;

    /// Creates a new alert rule builder.
    pub fn builder(name: impl Into<String>) -> AlertRuleBuilder {
        AlertRuleBuilder::new(name)
    }
}

/// Builder for creating [`AlertRule`] instances.
#[derive(Debug)]
pub struct AlertRuleBuilder {
    id: Option<String>,
    name: String,
    description: String,
    enabled: bool,
    priority: AlertSeverity,
    conditions: Vec<Condition>,
    logical_operator: LogicalOperator,
    evaluation_window_minutes: u32,
    cooldown_period_minutes: u32,
    suppress_duplicates: bool,
}

impl AlertRuleBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: AlertSeverity::Medium,
            conditions: Vec::new(),
            logical_operator: LogicalOperator::And,
            evaluation_window_minutes: default_evaluation_window(),
            cooldown_period_minutes: 0,
            suppress_duplicates: true,
        }
    }

    /// Sets a fixed rule id instead of a generated one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: AlertSeverity) -> Self {
        self.priority = priority;
        self
    }

    /// Appends a condition.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets how conditions combine.
    #[must_use]
    pub const fn logical_operator(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = op;
        self
    }

    /// Sets the evaluation window in minutes.
    #[must_use]
    pub const fn evaluation_window_minutes(mut self, minutes: u32) -> Self {
        self.evaluation_window_minutes = minutes;
        self
    }

    /// Sets the cooldown in minutes.
    #[must_use]
    pub const fn cooldown_minutes(mut self, minutes: u32) -> Self {
        self.cooldown_period_minutes = minutes;
        self
    }

    /// Sets whether duplicates inside the cooldown are suppressed.
    #[must_use]
    pub const fn suppress_duplicates(mut self, suppress: bool) -> Self {
        self.suppress_duplicates = suppress;
        self
    }

    /// Sets whether the rule is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builds the [`AlertRule`].
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfiguration` if:
    /// - The name is empty or exceeds the maximum length
    /// - The rule has no conditions
    pub fn build(self) -> Result<AlertRule> {
        if self.name.trim().is_empty() {
            return Err(AlertError::InvalidConfiguration {
                reason: "rule name cannot be empty".to_string(),
            });
        }

        if self.name.len() > AlertRule::MAX_NAME_LENGTH {
            return Err(AlertError::InvalidConfiguration {
                reason: format!(
                    "rule name exceeds maximum length of {} characters",
                    AlertRule::MAX_NAME_LENGTH
                ),
            });
        }

        if self.conditions.is_empty() {
            return Err(AlertError::InvalidConfiguration {
                reason: format!("rule '{}' has no conditions", self.name),
            });
        }

        Ok(AlertRule {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            priority: self.priority,
            conditions: self.conditions,
            logical_operator: self.logical_operator,
            evaluation_window_minutes: self.evaluation_window_minutes,
            cooldown_period_minutes: self.cooldown_period_minutes,
            suppress_duplicates: self.suppress_duplicates,
        })
    }
}

/// Business impact classification of a configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    /// Negligible impact.
    #[default]
    Low,
    /// Noticeable impact.
    Medium,
    /// Significant cost or comfort impact.
    High,
    /// Safety or major financial impact.
    Critical,
}

/// Business impact tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessImpact {
    /// Impact level.
    #[serde(default)]
    pub level: ImpactLevel,
    /// Estimated cost per hour of an unhandled alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_per_hour: Option<f64>,
    /// Affected building systems (e.g. `hvac`, `lighting`).
    #[serde(default)]
    pub affected_systems: Vec<String>,
}

/// A declared maintenance window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    /// Start of maintenance (inclusive).
    pub start: DateTime<Utc>,
    /// End of maintenance (exclusive).
    pub end: DateTime<Utc>,
    /// Why maintenance is happening.
    #[serde(default)]
    pub reason: String,
}

impl MaintenanceWindow {
    /// Returns true if `at` falls inside the window.
    #[must_use]
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Free-form configuration metadata the engine interprets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationMetadata {
    /// Business impact tags.
    #[serde(default)]
    pub business_impact: BusinessImpact,
    /// Raise severity one level when impact is high or critical.
    #[serde(default)]
    pub severity_auto_adjust: bool,
    /// Suppress non-critical alerts during this window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_suppression: Option<MaintenanceWindow>,
    /// Site business hours, used for contributing factors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_hours: Option<BusinessHours>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The top-level object a user manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfiguration {
    /// Unique identifier.
    pub id: String,
    /// Display name, used for alert titles.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Creator.
    pub owner_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ConfigurationStatus,
    /// Rules, in priority-tie order.
    pub rules: Vec<AlertRule>,
    /// How alerts are delivered.
    #[serde(default)]
    pub notification_settings: NotificationSettings,
    /// How unacknowledged alerts escalate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_policy: Option<EscalationPolicy>,
    /// Business-impact and suppression metadata.
    #[serde(default)]
    pub metadata: ConfigurationMetadata,
    /// Creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AlertConfiguration {
    /// Creates an active configuration with default settings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        owner_id: impl Into<String>,
        organization_id: impl Into<String>,
        rules: Vec<AlertRule>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            owner_id: owner_id.into(),
            organization_id: organization_id.into(),
            status: ConfigurationStatus::Active,
            rules,
            notification_settings: NotificationSettings::default(),
            escalation_policy: None,
            metadata: ConfigurationMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Finds a rule by id.
    #[must_use]
    pub fn rule(&self, rule_id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == rule_id)
    }
}

/// Outdoor weather at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    /// Outdoor temperature in degrees Celsius.
    pub temperature_c: f64,
    /// Relative humidity, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<f64>,
    /// Short description (e.g. `clear`, `storm`).
    #[serde(default)]
    pub conditions: String,
}

/// Building occupancy at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancyData {
    /// People currently in the building.
    pub current_occupancy: u32,
    /// Rated capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

impl OccupancyData {
    /// Returns occupancy as a fraction of capacity.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        self.capacity
            .filter(|c| *c > 0)
            .map(|c| f64::from(self.current_occupancy) / f64::from(c))
    }
}

/// Building systems status at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Sensors reporting.
    #[serde(default)]
    pub online_sensors: u32,
    /// Sensors silent.
    #[serde(default)]
    pub offline_sensors: u32,
    /// Active equipment faults.
    #[serde(default)]
    pub active_faults: Vec<String>,
}

/// Everything an evaluation pass sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// The evaluation instant.
    pub current_time: DateTime<Utc>,
    /// Candidate readings.
    #[serde(default)]
    pub sensor_readings: Vec<SensorReading>,
    /// Older readings, used by anomaly classification.
    #[serde(default)]
    pub historical_data: Vec<SensorReading>,
    /// Weather, for contributing factors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_data: Option<WeatherData>,
    /// Occupancy, for contributing factors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy_data: Option<OccupancyData>,
    /// Systems status, for contributing factors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_status: Option<SystemStatus>,
}

impl EvaluationContext {
    /// Creates a context with readings only.
    #[must_use]
    pub const fn new(current_time: DateTime<Utc>, sensor_readings: Vec<SensorReading>) -> Self {
        Self {
            current_time,
            sensor_readings,
            historical_data: Vec::new(),
            weather_data: None,
            occupancy_data: None,
            system_status: None,
        }
    }

    /// Sets weather data.
    #[must_use]
    pub fn with_weather(mut self, weather: WeatherData) -> Self {
        self.weather_data = Some(weather);
        self
    }

    /// Sets occupancy data.
    #[must_use]
    pub const fn with_occupancy(mut self, occupancy: OccupancyData) -> Self {
        self.occupancy_data = Some(occupancy);
        self
    }

    /// Sets systems status.
    #[must_use]
    pub fn with_system_status(mut self, status: SystemStatus) -> Self {
        self.system_status = Some(status);
        self
    }

    /// Sets historical readings.
    #[must_use]
    pub fn with_history(mut self, history: Vec<SensorReading>) -> Self {
        self.historical_data = history;
        self
    }

    /// Returns true if the context has no readings at all.
    #[must_use]
    pub fn has_no_readings(&self) -> bool {
        self.sensor_readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitewatch_metrics::AggregationFunction;
    use test_case::test_case;

    fn energy_condition() -> Condition {
        Condition::new(
            MetricSelector::new("energy_consumption").unwrap(),
            ComparisonOperator::GreaterThan,
            1500.0,
            TimeAggregation::new(AggregationFunction::Sum, 60, 12).unwrap(),
        )
    }

    mod severity_tests {
        use super::*;

        #[test]
        fn severity_ordering() {
            assert!(AlertSeverity::Info < AlertSeverity::Low);
            assert!(AlertSeverity::Low < AlertSeverity::Medium);
            assert!(AlertSeverity::Medium < AlertSeverity::High);
            assert!(AlertSeverity::High < AlertSeverity::Critical);
        }

        #[test]
        fn severity_escalated_saturates() {
            assert_eq!(AlertSeverity::High.escalated(), AlertSeverity::Critical);
            assert_eq!(AlertSeverity::Critical.escalated(), AlertSeverity::Critical);
        }

        #[test]
        fn severity_display() {
            assert_eq!(format!("{}", AlertSeverity::Critical), "critical");
            assert_eq!(format!("{}", AlertSeverity::Info), "info");
        }

        #[test]
        fn severity_deserializes_lowercase() {
            let parsed: AlertSeverity = serde_json::from_str("\"high\"").unwrap();
            assert_eq!(parsed, AlertSeverity::High);
        }
    }

    mod operator_tests {
        use super::*;
        use test_case::test_case;

        #[test_case(ComparisonOperator::GreaterThan, 10.0, 5.0, true)]
        #[test_case(ComparisonOperator::GreaterThan, 5.0, 5.0, false)]
        #[test_case(ComparisonOperator::GreaterThanOrEqual, 5.0, 5.0, true)]
        #[test_case(ComparisonOperator::LessThan, 4.0, 5.0, true)]
        #[test_case(ComparisonOperator::LessThan, 5.0, 5.0, false)]
        #[test_case(ComparisonOperator::LessThanOrEqual, 5.0, 5.0, true)]
        #[test_case(ComparisonOperator::Equals, 5.0, 5.0, true)]
        #[test_case(ComparisonOperator::NotEquals, 5.0, 5.0, false)]
        #[test_case(ComparisonOperator::Equals, 1321.1999999999998, 1321.2, true ; "equals tolerates rounding")]
        #[test_case(ComparisonOperator::NotEquals, 1321.1999999999998, 1321.2, false ; "not equals tolerates rounding")]
        #[test_case(ComparisonOperator::Equals, 1321.1, 1321.2, false ; "equals rejects real difference")]
        #[test_case(ComparisonOperator::AnomalyDetected, 0.9, 0.8, true)]
        #[test_case(ComparisonOperator::AnomalyDetected, 0.7, 0.8, false)]
        fn evaluate(op: ComparisonOperator, left: f64, right: f64, expected: bool) {
            assert_eq!(op.evaluate(left, right), expected);
        }

        #[test]
        fn operator_deserializes_snake_case() {
            let parsed: ComparisonOperator =
                serde_json::from_str("\"greater_than_or_equal\"").unwrap();
            assert_eq!(parsed, ComparisonOperator::GreaterThanOrEqual);
        }

        #[test]
        fn logical_operator_uppercase() {
            let parsed: LogicalOperator = serde_json::from_str("\"OR\"").unwrap();
            assert_eq!(parsed, LogicalOperator::Or);
        }
    }

    mod rule_tests {
        use super::*;

        #[test]
        fn build_rule() {
            let rule = AlertRule::builder("High energy")
                .id("rule-1")
                .priority(AlertSeverity::Critical)
                .condition(energy_condition())
                .cooldown_minutes(30)
                .build()
                .unwrap();

            assert_eq!(rule.id, "rule-1");
            assert_eq!(rule.priority, AlertSeverity::Critical);
            assert_eq!(rule.cooldown_period_minutes, 30);
            assert!(rule.enabled);
            assert!(rule.suppress_duplicates);
        }

        #[test]
        fn rule_without_conditions_fails() {
            let result = AlertRule::builder("Empty").build();
            assert!(matches!(
                result,
                Err(AlertError::InvalidConfiguration { .. })
            ));
        }

        #[test]
        fn rule_name_too_long_fails() {
            let result = AlertRule::builder("a".repeat(AlertRule::MAX_NAME_LENGTH + 1))
                .condition(energy_condition())
                .build();
            assert!(result.is_err());
        }

        #[test]
        fn rule_defaults_from_json() {
            let json = serde_json::json!({
                "id": "r1",
                "name": "Energy",
                "priority": "high",
                "conditions": [{
                    "id": "c1",
                    "metric": {"type": "energy_consumption"},
                    "operator": "greater_than",
                    "threshold": {"value": 10.0},
                    "time_aggregation": {"function": "sum", "period_minutes": 60}
                }]
            });
            let rule: AlertRule = serde_json::from_value(json).unwrap();
            assert!(rule.enabled);
            assert!(rule.suppress_duplicates);
            assert_eq!(rule.logical_operator, LogicalOperator::And);
            assert_eq!(rule.conditions[0].time_aggregation.minimum_data_points, 0);
        }
    }

    mod configuration_tests {
        use super::*;
        use chrono::Duration;

        #[test]
        fn only_active_is_evaluated() {
            assert!(ConfigurationStatus::Active.is_evaluated());
            assert!(!ConfigurationStatus::Draft.is_evaluated());
            assert!(!ConfigurationStatus::Paused.is_evaluated());
        }

        #[test]
        fn maintenance_window_half_open() {
            let start = Utc::now();
            let window = MaintenanceWindow {
                start,
                end: start + Duration::hours(1),
                reason: "chiller service".to_string(),
            };
            assert!(window.is_active_at(start));
            assert!(!window.is_active_at(start + Duration::hours(1)));
        }

        #[test]
        fn occupancy_ratio() {
            let occupancy = OccupancyData {
                current_occupancy: 90,
                capacity: Some(100),
            };
            assert!((occupancy.ratio().unwrap() - 0.9).abs() < f64::EPSILON);
            assert!(OccupancyData::default().ratio().is_none());
        }

        #[test]
        fn configuration_lookup_rule() {
            let rule = AlertRule::builder("Energy")
                .id("r1")
                .condition(energy_condition())
                .build()
                .unwrap();
            let config = AlertConfiguration::new("HQ energy", "user-1", "org-1", vec![rule]);

            assert!(config.rule("r1").is_some());
            assert!(config.rule("r2").is_none());
            assert_eq!(config.status, ConfigurationStatus::Active);
        }
    }
}
