//! Static validation of alert configurations.
//!
//! Validation looks only at the configuration and the organization's
//! subscription limits, never at live data. Problems are reported as
//! structured [`ValidationIssue`]s rather than a single error.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::parse_timezone;
use crate::settings::{ChannelConfig, ChannelKind};
use crate::types::{AlertConfiguration, AlertRule, AlertSeverity, ComparisonOperator, ImpactLevel};

/// Subscription tiers, cheapest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Free tier.
    #[default]
    Free,
    /// Paid tier for single sites.
    Professional,
    /// Multi-site tier.
    Enterprise,
}

impl SubscriptionTier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 3] = [Self::Free, Self::Professional, Self::Enterprise];

    /// Returns the tier as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-message delivery cost, in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotificationCosts {
    /// Cost of one email.
    pub email: f64,
    /// Cost of one SMS.
    pub sms: f64,
    /// Cost of one webhook call.
    pub webhook: f64,
}

impl Default for NotificationCosts {
    fn default() -> Self {
        Self {
            email: 0.001,
            sms: 0.0075,
            webhook: 0.0,
        }
    }
}

impl NotificationCosts {
    /// Returns the cost of one message on `kind`.
    #[must_use]
    pub const fn for_channel(&self, kind: ChannelKind) -> f64 {
        match kind {
            ChannelKind::Email => self.email,
            ChannelKind::Sms => self.sms,
            ChannelKind::Webhook => self.webhook,
        }
    }
}

/// What a subscription tier allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    /// The tier these limits belong to.
    pub tier: SubscriptionTier,
    /// Rules per configuration.
    pub max_rules_per_configuration: usize,
    /// Conditions per rule.
    pub max_conditions_per_rule: usize,
    /// Whether `anomaly_detected` conditions are allowed.
    pub anomaly_detection: bool,
    /// Channel kinds allowed.
    pub allowed_channels: Vec<ChannelKind>,
    /// Escalation stages per policy.
    pub max_escalation_stages: usize,
    /// Delivery costs used for estimates.
    #[serde(default)]
    pub costs: NotificationCosts,
}

impl TierLimits {
    /// Returns the built-in limits of `tier`.
    #[must_use]
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        let (rules, conditions, anomaly, channels, stages) = match tier {
            SubscriptionTier::Free => (3, 2, false, vec![ChannelKind::Email], 0),
            SubscriptionTier::Professional => (
                20,
                5,
                true,
                vec![ChannelKind::Email, ChannelKind::Sms, ChannelKind::Webhook],
                3,
            ),
            SubscriptionTier::Enterprise => (
                100,
                10,
                true,
                vec![ChannelKind::Email, ChannelKind::Sms, ChannelKind::Webhook],
                10,
            ),
        };
        Self {
            tier,
            max_rules_per_configuration: rules,
            max_conditions_per_rule: conditions,
            anomaly_detection: anomaly,
            allowed_channels: channels,
            max_escalation_stages: stages,
            costs: NotificationCosts::default(),
        }
    }

    /// Returns the reasons `config` exceeds these limits.
    #[must_use]
    pub fn limitations(&self, config: &AlertConfiguration) -> Vec<String> {
        let mut limitations = Vec::new();
        if config.rules.len() > self.max_rules_per_configuration {
            limitations.push(format!(
                "{} tier allows {} rules per configuration, found {}",
                self.tier,
                self.max_rules_per_configuration,
                config.rules.len()
            ));
        }
        if let Some(rule) = config
            .rules
            .iter()
            .find(|r| r.conditions.len() > self.max_conditions_per_rule)
        {
            limitations.push(format!(
                "{} tier allows {} conditions per rule, rule '{}' has {}",
                self.tier,
                self.max_conditions_per_rule,
                rule.name,
                rule.conditions.len()
            ));
        }
        if !self.anomaly_detection && uses_anomaly_detection(config) {
            limitations.push(format!("{} tier does not include anomaly detection", self.tier));
        }
        let mut kinds: Vec<ChannelKind> = config
            .notification_settings
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(crate::settings::ChannelSettings::kind)
            .filter(|k| !self.allowed_channels.contains(k))
            .collect();
        kinds.sort();
        kinds.dedup();
        for kind in kinds {
            limitations.push(format!("{} tier does not include {kind} notifications", self.tier));
        }
        if let Some(policy) = &config.escalation_policy {
            if policy.stages.len() > self.max_escalation_stages {
                limitations.push(format!(
                    "{} tier allows {} escalation stages, found {}",
                    self.tier,
                    self.max_escalation_stages,
                    policy.stages.len()
                ));
            }
        }
        limitations
    }
}

fn uses_anomaly_detection(config: &AlertConfiguration) -> bool {
    config
        .rules
        .iter()
        .flat_map(|r| &r.conditions)
        .any(|c| c.operator == ComparisonOperator::AnomalyDetected)
}

/// Supplies subscription limits per organization.
pub trait SubscriptionProvider: Send + Sync + fmt::Debug {
    /// Returns the limits of the organization's current tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be looked up.
    fn limits(&self, organization_id: &str) -> Result<TierLimits>;
}

/// Subscription provider backed by a fixed tier table.
#[derive(Debug, Clone, Default)]
pub struct StaticSubscriptionProvider {
    default_tier: SubscriptionTier,
    organizations: HashMap<String, SubscriptionTier>,
}

impl StaticSubscriptionProvider {
    /// Creates a provider that puts every organization on `default_tier`.
    #[must_use]
    pub fn new(default_tier: SubscriptionTier) -> Self {
        Self {
            default_tier,
            organizations: HashMap::new(),
        }
    }

    /// Assigns a tier to one organization.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>, tier: SubscriptionTier) -> Self {
        self.organizations.insert(organization_id.into(), tier);
        self
    }
}

impl SubscriptionProvider for StaticSubscriptionProvider {
    fn limits(&self, organization_id: &str) -> Result<TierLimits> {
        let tier = self
            .organizations
            .get(organization_id)
            .copied()
            .unwrap_or(self.default_tier);
        Ok(TierLimits::for_tier(tier))
    }
}

/// Whether an issue blocks the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The configuration cannot be activated.
    Error,
    /// Allowed, but probably not intended.
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path of the offending field (e.g. `rules[0].conditions[1].threshold`).
    pub field: String,
    /// Stable machine-readable code.
    pub error_code: String,
    /// Human-readable message.
    pub message: String,
    /// Error or warning.
    pub severity: IssueSeverity,
}

/// Expected alert volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertVolumeEstimate {
    /// Alerts per day.
    pub daily: f64,
    /// Alerts per 30-day month.
    pub monthly: f64,
}

/// Whether the configuration fits the organization's subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCompatibility {
    /// True if the current tier covers the configuration.
    pub compatible: bool,
    /// The organization's tier.
    pub current_tier: SubscriptionTier,
    /// Cheapest tier covering the configuration, if any does.
    pub required_tier: Option<SubscriptionTier>,
    /// What the current tier does not cover.
    pub limitations: Vec<String>,
}

/// The result of validating a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True if there are no errors.
    pub is_valid: bool,
    /// Blocking findings.
    pub errors: Vec<ValidationIssue>,
    /// Non-blocking findings.
    pub warnings: Vec<ValidationIssue>,
    /// Expected alert volume.
    pub estimated_alert_volume: AlertVolumeEstimate,
    /// Expected monthly notification cost.
    pub estimated_cost_impact: f64,
    /// Subscription fit.
    pub subscription_compatibility: SubscriptionCompatibility,
}

impl ValidationReport {
    /// Returns true if any issue carries `code`.
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.errors
            .iter()
            .chain(&self.warnings)
            .any(|i| i.error_code == code)
    }
}

#[derive(Default)]
struct Issues {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Issues {
    fn error(&mut self, field: impl Into<String>, code: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            error_code: code.to_string(),
            message: message.into(),
            severity: IssueSeverity::Error,
        });
    }

    fn warning(&mut self, field: impl Into<String>, code: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            field: field.into(),
            error_code: code.to_string(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        });
    }
}

const MAX_COOLDOWN_MINUTES: u32 = 7 * 24 * 60;
const MINUTES_PER_DAY: f64 = 1440.0;
const DAYS_PER_MONTH: f64 = 30.0;

/// Validates `config` against `limits`.
#[must_use]
pub fn validate_configuration(config: &AlertConfiguration, limits: &TierLimits) -> ValidationReport {
    let mut issues = Issues::default();

    check_identity(config, &mut issues);
    check_rules(config, limits, &mut issues);
    check_notifications(config, limits, &mut issues);
    check_escalation(config, limits, &mut issues);
    check_metadata(config, &mut issues);

    let limitations = limits.limitations(config);
    let required_tier = SubscriptionTier::ALL
        .into_iter()
        .find(|tier| TierLimits::for_tier(*tier).limitations(config).is_empty());
    let compatibility = SubscriptionCompatibility {
        compatible: limitations.is_empty(),
        current_tier: limits.tier,
        required_tier,
        limitations,
    };

    let volume = estimate_volume(config);
    let cost = estimate_monthly_cost(config, limits, volume.monthly);

    ValidationReport {
        is_valid: issues.errors.is_empty(),
        errors: issues.errors,
        warnings: issues.warnings,
        estimated_alert_volume: volume,
        estimated_cost_impact: cost,
        subscription_compatibility: compatibility,
    }
}

fn check_identity(config: &AlertConfiguration, issues: &mut Issues) {
    if config.name.trim().is_empty() {
        issues.error("name", "NAME_REQUIRED", "configuration name cannot be empty");
    }
    if config.owner_id.trim().is_empty() {
        issues.error("owner_id", "OWNER_REQUIRED", "configuration must have an owner");
    }
    if config.organization_id.trim().is_empty() {
        issues.error(
            "organization_id",
            "ORGANIZATION_REQUIRED",
            "configuration must belong to an organization",
        );
    }
}

fn check_rules(config: &AlertConfiguration, limits: &TierLimits, issues: &mut Issues) {
    if config.rules.is_empty() {
        issues.error("rules", "RULES_REQUIRED", "configuration must have at least one rule");
        return;
    }
    if config.rules.len() > limits.max_rules_per_configuration {
        issues.error(
            "rules",
            "TIER_RULE_LIMIT",
            format!(
                "{} rules exceed the {} tier limit of {}",
                config.rules.len(),
                limits.tier,
                limits.max_rules_per_configuration
            ),
        );
    }
    if config.rules.iter().all(|r| !r.enabled) {
        issues.warning("rules", "ALL_RULES_DISABLED", "no rule is enabled");
    }

    let mut ids = HashSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        let path = format!("rules[{i}]");
        if !ids.insert(rule.id.as_str()) {
            issues.error(format!("{path}.id"), "DUPLICATE_RULE_ID", format!("rule id '{}' is repeated", rule.id));
        }
        check_rule(rule, &path, limits, issues);
    }
}

fn check_rule(rule: &AlertRule, path: &str, limits: &TierLimits, issues: &mut Issues) {
    if rule.name.trim().is_empty() {
        issues.error(format!("{path}.name"), "RULE_NAME_REQUIRED", "rule name cannot be empty");
    }
    if rule.evaluation_window_minutes == 0 {
        issues.error(
            format!("{path}.evaluation_window_minutes"),
            "INVALID_EVALUATION_WINDOW",
            "evaluation window must be at least one minute",
        );
    }
    if rule.suppress_duplicates && rule.cooldown_period_minutes == 0 {
        issues.warning(
            format!("{path}.cooldown_period_minutes"),
            "NO_COOLDOWN",
            "duplicate suppression has no effect without a cooldown",
        );
    }
    if rule.cooldown_period_minutes > MAX_COOLDOWN_MINUTES {
        issues.warning(
            format!("{path}.cooldown_period_minutes"),
            "LONG_COOLDOWN",
            "cooldown longer than a week may hide recurring problems",
        );
    }

    if rule.conditions.is_empty() {
        issues.error(format!("{path}.conditions"), "CONDITIONS_REQUIRED", "rule must have at least one condition");
    }
    if rule.conditions.len() > limits.max_conditions_per_rule {
        issues.error(
            format!("{path}.conditions"),
            "TIER_CONDITION_LIMIT",
            format!(
                "{} conditions exceed the {} tier limit of {}",
                rule.conditions.len(),
                limits.tier,
                limits.max_conditions_per_rule
            ),
        );
    }

    for (j, condition) in rule.conditions.iter().enumerate() {
        let cpath = format!("{path}.conditions[{j}]");
        if condition.metric.metric_type.trim().is_empty() {
            issues.error(format!("{cpath}.metric.type"), "METRIC_TYPE_REQUIRED", "metric type cannot be empty");
        }
        if !condition.threshold.value.is_finite() {
            issues.error(format!("{cpath}.threshold.value"), "INVALID_THRESHOLD", "threshold must be a finite number");
        } else if condition.threshold.value < 0.0 && condition.operator != ComparisonOperator::AnomalyDetected {
            issues.warning(
                format!("{cpath}.threshold.value"),
                "NEGATIVE_THRESHOLD",
                "negative thresholds are unusual for building sensors",
            );
        }
        if let Err(e) = condition.time_aggregation.validate() {
            issues.error(format!("{cpath}.time_aggregation.period_minutes"), "INVALID_AGGREGATION_PERIOD", e.to_string());
        }
        if condition.time_aggregation.minimum_data_points == 0 {
            issues.warning(
                format!("{cpath}.time_aggregation.minimum_data_points"),
                "LOW_DATA_POINTS",
                "a single reading will be enough to trigger",
            );
        }
        for (k, filter) in condition.filters.iter().enumerate() {
            if let Err(e) = filter.validate() {
                issues.error(format!("{cpath}.filters[{k}]"), "INVALID_FILTER", e.to_string());
            }
        }
        if condition.operator == ComparisonOperator::AnomalyDetected {
            if !limits.anomaly_detection {
                issues.error(
                    format!("{cpath}.operator"),
                    "ANOMALY_NOT_ENTITLED",
                    format!("anomaly detection is not included in the {} tier", limits.tier),
                );
            }
            let level = condition.threshold.confidence_level_or_default();
            if !(level > 0.0 && level <= 1.0) {
                issues.error(
                    format!("{cpath}.threshold.confidence_level"),
                    "INVALID_CONFIDENCE_LEVEL",
                    "confidence level must be in (0, 1]",
                );
            }
        }
    }
}

fn check_notifications(config: &AlertConfiguration, limits: &TierLimits, issues: &mut Issues) {
    let settings = &config.notification_settings;
    if settings.channels.iter().all(|c| !c.enabled) {
        issues.warning("notification_settings.channels", "NO_CHANNELS", "alerts will not be delivered anywhere");
    }

    let mut ids = HashSet::new();
    for (i, channel) in settings.channels.iter().enumerate() {
        let path = format!("notification_settings.channels[{i}]");
        if !ids.insert(channel.id.as_str()) {
            issues.error(format!("{path}.id"), "DUPLICATE_CHANNEL_ID", format!("channel id '{}' is repeated", channel.id));
        }
        if channel.enabled && !limits.allowed_channels.contains(&channel.kind()) {
            issues.error(
                format!("{path}.config.type"),
                "CHANNEL_NOT_ENTITLED",
                format!("{} notifications are not included in the {} tier", channel.kind(), limits.tier),
            );
        }
        match &channel.config {
            ChannelConfig::Webhook { url, timeout_ms, .. } => {
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    issues.error(format!("{path}.config.url"), "INVALID_WEBHOOK_URL", "webhook url must be http(s)");
                }
                if *timeout_ms == Some(0) {
                    issues.error(format!("{path}.config.timeout_ms"), "INVALID_TIMEOUT", "timeout must be positive");
                }
            }
            ChannelConfig::Sms { max_length: Some(0), .. } => {
                issues.error(format!("{path}.config.max_length"), "INVALID_SMS_LENGTH", "max length must be positive");
            }
            _ => {}
        }
        if channel.enabled {
            let kind = channel.kind();
            if kind != ChannelKind::Webhook && !settings.recipients.iter().any(|r| r.address_for(kind).is_some()) {
                issues.warning(
                    path.clone(),
                    "NO_RECIPIENTS_FOR_CHANNEL",
                    format!("no recipient has a {kind} contact"),
                );
            }
        }
    }

    for (i, recipient) in settings.recipients.iter().enumerate() {
        if let Some(on_call) = &recipient.on_call {
            if parse_timezone(&on_call.timezone).is_err() {
                issues.error(
                    format!("notification_settings.recipients[{i}].on_call.timezone"),
                    "INVALID_TIMEZONE",
                    format!("unknown timezone '{}'", on_call.timezone),
                );
            }
            if on_call.days_of_week.iter().any(|d| *d > 6) {
                issues.error(
                    format!("notification_settings.recipients[{i}].on_call.days_of_week"),
                    "INVALID_WEEKDAY",
                    "days of week must be 0 (Sunday) to 6 (Saturday)",
                );
            }
        }
    }

    if let Some(quiet) = &settings.quiet_hours {
        if parse_timezone(&quiet.timezone).is_err() {
            issues.error(
                "notification_settings.quiet_hours.timezone",
                "INVALID_TIMEZONE",
                format!("unknown timezone '{}'", quiet.timezone),
            );
        }
        if quiet.enabled && quiet.start_time == quiet.end_time && !quiet.weekend_override {
            issues.warning(
                "notification_settings.quiet_hours",
                "EMPTY_QUIET_HOURS",
                "start and end are equal, quiet hours never apply",
            );
        }
    }
}

fn check_escalation(config: &AlertConfiguration, limits: &TierLimits, issues: &mut Issues) {
    let Some(policy) = &config.escalation_policy else {
        if config.metadata.business_impact.level >= ImpactLevel::Critical {
            issues.warning(
                "escalation_policy",
                "MISSING_ESCALATION",
                "critical business impact without an escalation policy",
            );
        }
        return;
    };

    if policy.stages.is_empty() {
        issues.error("escalation_policy.stages", "ESCALATION_STAGES_REQUIRED", "escalation policy has no stages");
    }
    if policy.stages.len() > limits.max_escalation_stages {
        issues.error(
            "escalation_policy.stages",
            "TIER_ESCALATION_LIMIT",
            format!(
                "{} stages exceed the {} tier limit of {}",
                policy.stages.len(),
                limits.tier,
                limits.max_escalation_stages
            ),
        );
    }
    if policy.max_escalations == 0 {
        issues.warning("escalation_policy.max_escalations", "NO_ESCALATIONS", "max escalations is zero, no stage will run");
    } else if policy.max_escalations as usize > policy.stages.len() {
        issues.warning(
            "escalation_policy.max_escalations",
            "MAX_EXCEEDS_STAGES",
            "max escalations exceeds the number of stages",
        );
    }
    if policy.auto_resolve && policy.auto_resolve_timeout_minutes == 0 {
        issues.error(
            "escalation_policy.auto_resolve_timeout_minutes",
            "INVALID_AUTO_RESOLVE",
            "auto resolve needs a positive timeout",
        );
    }

    for (i, stage) in policy.stages.iter().enumerate() {
        let path = format!("escalation_policy.stages[{i}]");
        if i > 0 && stage.level <= policy.stages[i - 1].level {
            issues.error(format!("{path}.level"), "ESCALATION_LEVEL_ORDER", "stage levels must increase");
        }
        if stage.recipients.is_empty() {
            issues.error(format!("{path}.recipients"), "STAGE_RECIPIENTS_REQUIRED", "stage has no recipients");
        }
        if stage.channels.is_empty() {
            issues.error(format!("{path}.channels"), "STAGE_CHANNELS_REQUIRED", "stage has no channels");
        }
        for kind in &stage.channels {
            if !limits.allowed_channels.contains(kind) {
                issues.error(
                    format!("{path}.channels"),
                    "CHANNEL_NOT_ENTITLED",
                    format!("{kind} notifications are not included in the {} tier", limits.tier),
                );
            }
        }
        if stage.require_acknowledgment && stage.acknowledgment_timeout_minutes == 0 {
            issues.error(
                format!("{path}.acknowledgment_timeout_minutes"),
                "INVALID_ACK_TIMEOUT",
                "acknowledgment timeout must be positive",
            );
        }
    }
}

fn check_metadata(config: &AlertConfiguration, issues: &mut Issues) {
    if let Some(window) = &config.metadata.maintenance_suppression {
        if window.end <= window.start {
            issues.error(
                "metadata.maintenance_suppression",
                "INVALID_MAINTENANCE_WINDOW",
                "maintenance window must end after it starts",
            );
        }
    }
    if let Some(hours) = &config.metadata.business_hours {
        if parse_timezone(&hours.timezone).is_err() {
            issues.error(
                "metadata.business_hours.timezone",
                "INVALID_TIMEZONE",
                format!("unknown timezone '{}'", hours.timezone),
            );
        }
    }
}

/// Expected share of evaluations that fire, by severity.
const fn trigger_rate(severity: AlertSeverity) -> f64 {
    match severity {
        AlertSeverity::Critical => 0.02,
        AlertSeverity::High => 0.05,
        AlertSeverity::Medium => 0.1,
        AlertSeverity::Low => 0.15,
        AlertSeverity::Info => 0.2,
    }
}

/// Estimates alert volume from evaluation cadence, cooldowns and priorities.
#[must_use]
pub fn estimate_volume(config: &AlertConfiguration) -> AlertVolumeEstimate {
    let mut daily: f64 = config
        .rules
        .iter()
        .filter(|r| r.enabled)
        .map(|rule| {
            let evaluations = MINUTES_PER_DAY / f64::from(rule.evaluation_window_minutes.max(1));
            let ceiling = if rule.suppress_duplicates && rule.cooldown_period_minutes > 0 {
                evaluations.min(MINUTES_PER_DAY / f64::from(rule.cooldown_period_minutes))
            } else {
                evaluations
            };
            ceiling * trigger_rate(rule.priority)
        })
        .sum();

    if let Some(cap) = config.notification_settings.frequency_limits.max_alerts_per_day {
        daily = daily.min(f64::from(cap));
    }
    AlertVolumeEstimate {
        daily,
        monthly: daily * DAYS_PER_MONTH,
    }
}

fn estimate_monthly_cost(config: &AlertConfiguration, limits: &TierLimits, monthly_alerts: f64) -> f64 {
    let settings = &config.notification_settings;
    let per_alert: f64 = settings
        .channels
        .iter()
        .filter(|c| c.enabled)
        .map(|channel| {
            let kind = channel.kind();
            let messages = if kind == ChannelKind::Webhook {
                1
            } else {
                settings
                    .recipients
                    .iter()
                    .filter(|r| r.address_for(kind).is_some())
                    .count()
            };
            messages as f64 * limits.costs.for_channel(kind)
        })
        .sum();
    per_alert * monthly_alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::{EscalationPolicy, EscalationStage};
    use crate::settings::{ChannelSettings, Recipient};
    use crate::types::{Condition, MaintenanceWindow};
    use chrono::{Duration, Utc};
    use sitewatch_metrics::{AggregationFunction, MetricSelector, TimeAggregation};

    fn condition(op: ComparisonOperator, threshold: f64) -> Condition {
        Condition::new(
            MetricSelector::new("energy_consumption").unwrap(),
            op,
            threshold,
            TimeAggregation::new(AggregationFunction::Sum, 60, 12).unwrap(),
        )
    }

    fn rule(id: &str) -> AlertRule {
        AlertRule::builder("Energy budget")
            .id(id)
            .priority(AlertSeverity::High)
            .cooldown_minutes(60)
            .condition(condition(ComparisonOperator::GreaterThan, 1500.0))
            .build()
            .unwrap()
    }

    fn config() -> AlertConfiguration {
        let mut config = AlertConfiguration::new("HQ energy", "user-1", "org-1", vec![rule("r1")]);
        config.notification_settings = config
            .notification_settings
            .with_channel(ChannelSettings::new("email", ChannelConfig::email()))
            .with_recipient(Recipient::new("fm", "Facilities").with_email("fm@example.com"));
        config
    }

    fn pro() -> TierLimits {
        TierLimits::for_tier(SubscriptionTier::Professional)
    }

    mod structure_tests {
        use super::*;

        #[test]
        fn valid_configuration() {
            let report = validate_configuration(&config(), &pro());
            assert!(report.is_valid, "{:?}", report.errors);
            assert!(report.subscription_compatibility.compatible);
            assert_eq!(report.subscription_compatibility.required_tier, Some(SubscriptionTier::Free));
        }

        #[test]
        fn missing_rules_and_name() {
            let mut c = config();
            c.name = String::new();
            c.rules.clear();
            let report = validate_configuration(&c, &pro());
            assert!(!report.is_valid);
            assert!(report.has_code("NAME_REQUIRED"));
            assert!(report.has_code("RULES_REQUIRED"));
        }

        #[test]
        fn duplicate_rule_ids() {
            let mut c = config();
            c.rules.push(rule("r1"));
            let report = validate_configuration(&c, &pro());
            assert!(report.has_code("DUPLICATE_RULE_ID"));
        }

        #[test]
        fn non_finite_threshold() {
            let mut c = config();
            c.rules[0].conditions[0].threshold.value = f64::NAN;
            let report = validate_configuration(&c, &pro());
            let issue = report
                .errors
                .iter()
                .find(|i| i.error_code == "INVALID_THRESHOLD")
                .unwrap();
            assert_eq!(issue.field, "rules[0].conditions[0].threshold.value");
            assert_eq!(issue.severity, IssueSeverity::Error);
        }

        #[test]
        fn negative_threshold_warns() {
            let mut c = config();
            c.rules[0].conditions[0].threshold.value = -5.0;
            let report = validate_configuration(&c, &pro());
            assert!(report.is_valid);
            assert!(report.warnings.iter().any(|w| w.error_code == "NEGATIVE_THRESHOLD"));
        }

        #[test]
        fn invalid_period() {
            let mut c = config();
            c.rules[0].conditions[0].time_aggregation.period_minutes = 0;
            assert!(validate_configuration(&c, &pro()).has_code("INVALID_AGGREGATION_PERIOD"));
        }

        #[test]
        fn inverted_maintenance_window() {
            let mut c = config();
            let now = Utc::now();
            c.metadata.maintenance_suppression = Some(MaintenanceWindow {
                start: now,
                end: now - Duration::hours(1),
                reason: String::new(),
            });
            assert!(validate_configuration(&c, &pro()).has_code("INVALID_MAINTENANCE_WINDOW"));
        }

        #[test]
        fn bad_webhook_url() {
            let mut c = config();
            c.notification_settings
                .channels
                .push(ChannelSettings::new("hook", ChannelConfig::webhook("ftp://x")));
            assert!(validate_configuration(&c, &pro()).has_code("INVALID_WEBHOOK_URL"));
        }
    }

    mod tier_tests {
        use super::*;

        #[test]
        fn anomaly_requires_paid_tier() {
            let mut c = config();
            c.rules[0]
                .conditions
                .push(condition(ComparisonOperator::AnomalyDetected, 0.0));
            let report = validate_configuration(&c, &TierLimits::for_tier(SubscriptionTier::Free));

            assert!(report.has_code("ANOMALY_NOT_ENTITLED"));
            assert!(!report.subscription_compatibility.compatible);
            assert_eq!(
                report.subscription_compatibility.required_tier,
                Some(SubscriptionTier::Professional)
            );
        }

        #[test]
        fn sms_not_in_free_tier() {
            let mut c = config();
            c.notification_settings
                .channels
                .push(ChannelSettings::new("sms", ChannelConfig::sms()));
            let report = validate_configuration(&c, &TierLimits::for_tier(SubscriptionTier::Free));
            assert!(report.has_code("CHANNEL_NOT_ENTITLED"));
        }

        #[test]
        fn static_provider_overrides() {
            let provider = StaticSubscriptionProvider::new(SubscriptionTier::Free)
                .with_organization("org-1", SubscriptionTier::Enterprise);
            assert_eq!(provider.limits("org-1").unwrap().tier, SubscriptionTier::Enterprise);
            assert_eq!(provider.limits("org-2").unwrap().tier, SubscriptionTier::Free);
        }
    }

    mod escalation_tests {
        use super::*;

        fn stage(level: u32) -> EscalationStage {
            EscalationStage::new(
                level,
                15,
                vec![Recipient::new("oncall", "On call").with_phone("+15550100")],
                vec![ChannelKind::Sms],
            )
        }

        #[test]
        fn stage_levels_must_increase() {
            let mut c = config();
            c.escalation_policy = Some(EscalationPolicy::new(vec![stage(2), stage(1)], 2));
            assert!(validate_configuration(&c, &pro()).has_code("ESCALATION_LEVEL_ORDER"));
        }

        #[test]
        fn missing_policy_for_critical_impact_warns() {
            let mut c = config();
            c.metadata.business_impact.level = ImpactLevel::Critical;
            let report = validate_configuration(&c, &pro());
            assert!(report.is_valid);
            assert!(report.has_code("MISSING_ESCALATION"));
        }

        #[test]
        fn well_formed_policy() {
            let mut c = config();
            c.escalation_policy = Some(EscalationPolicy::new(vec![stage(1), stage(2)], 2));
            let report = validate_configuration(&c, &pro());
            assert!(report.is_valid, "{:?}", report.errors);
        }
    }

    mod estimate_tests {
        use super::*;

        #[test]
        fn cooldown_caps_volume() {
            let c = config();
            let volume = estimate_volume(&c);
            // 24 alerts per day at most with a 60 minute cooldown, 5% for high priority.
            assert!((volume.daily - 1.2).abs() < 1e-9);
            assert!((volume.monthly - 36.0).abs() < 1e-9);
        }

        #[test]
        fn frequency_limit_caps_volume() {
            let mut c = config();
            c.rules[0].cooldown_period_minutes = 0;
            c.notification_settings.frequency_limits.max_alerts_per_day = Some(2);
            assert!((estimate_volume(&c).daily - 2.0).abs() < 1e-9);
        }

        #[test]
        fn cost_scales_with_recipients() {
            let c = config();
            let report = validate_configuration(&c, &pro());
            let expected = 36.0 * NotificationCosts::default().email;
            assert!((report.estimated_cost_impact - expected).abs() < 1e-9);
        }
    }
}
