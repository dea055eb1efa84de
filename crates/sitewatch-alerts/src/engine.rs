//! The alert rule engine.
//!
//! [`AlertRuleEngine`] is the entry point for evaluation. Each configuration
//! is evaluated on its own: a malformed configuration or a store failure is
//! logged and skipped, and the remaining configurations still produce their
//! alerts.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::alert::AlertInstance;
use crate::condition::{AnomalyClassifier, ConditionEvaluator};
use crate::config::EngineConfig;
use crate::dedup::DeduplicationGuard;
use crate::error::{AlertError, Result};
use crate::factory::AlertFactory;
use crate::rule::{RuleEvaluator, RuleOutcome};
use crate::store::AlertStore;
use crate::types::{AlertConfiguration, AlertRule, EvaluationContext};
use crate::validation::{
    validate_configuration, StaticSubscriptionProvider, SubscriptionProvider, ValidationReport,
};

/// Evaluates alert configurations against sensor data.
#[derive(Debug, Clone)]
pub struct AlertRuleEngine {
    config: EngineConfig,
    conditions: ConditionEvaluator,
    dedup: DeduplicationGuard,
    factory: AlertFactory,
    subscriptions: Arc<dyn SubscriptionProvider>,
}

impl AlertRuleEngine {
    /// Creates an engine over `store`, with no anomaly classifier and every
    /// organization on the free tier.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, config: EngineConfig) -> Self {
        Self {
            dedup: DeduplicationGuard::new(Arc::clone(&store)),
            factory: AlertFactory::new(store, config.related_alert_lookback_minutes),
            conditions: ConditionEvaluator::new(),
            subscriptions: Arc::new(StaticSubscriptionProvider::default()),
            config,
        }
    }

    /// Sets the classifier used by `anomaly_detected` conditions.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn AnomalyClassifier>) -> Self {
        self.conditions = self.conditions.with_classifier(classifier);
        self
    }

    /// Sets the subscription provider used by validation.
    #[must_use]
    pub fn with_subscriptions(mut self, subscriptions: Arc<dyn SubscriptionProvider>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates every active configuration and returns at most one alert per
    /// configuration.
    ///
    /// An alert returned for a rule still inside its cooldown is the one
    /// raised before, with the same id.
    #[must_use]
    pub fn evaluate_alerts(
        &self,
        configurations: &[AlertConfiguration],
        context: &EvaluationContext,
    ) -> Vec<AlertInstance> {
        if context.has_no_readings() {
            debug!("no sensor readings; nothing to evaluate");
            return Vec::new();
        }

        let rules = RuleEvaluator::new(self.conditions.clone(), self.config.clone());
        let mut alerts = Vec::new();
        for configuration in configurations {
            if !configuration.status.is_evaluated() {
                debug!(
                    configuration_id = %configuration.id,
                    status = ?configuration.status,
                    "configuration not active"
                );
                continue;
            }
            match self.evaluate_configuration(&rules, configuration, context) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(e) => warn!(
                    configuration_id = %configuration.id,
                    error = %e,
                    "configuration evaluation failed"
                ),
            }
        }

        info!(
            configurations = configurations.len(),
            alerts = alerts.len(),
            "evaluation complete"
        );
        alerts
    }

    fn evaluate_configuration(
        &self,
        rules: &RuleEvaluator,
        configuration: &AlertConfiguration,
        context: &EvaluationContext,
    ) -> Result<Option<AlertInstance>> {
        check_structure(configuration)?;

        let fired = configuration
            .rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| (rule, rules.evaluate(configuration, rule, context)))
            .filter(|(_, outcome)| outcome.fired)
            .fold(None::<(&AlertRule, RuleOutcome)>, |best, (rule, outcome)| match best {
                Some(kept) if kept.1.severity >= outcome.severity => Some(kept),
                _ => Some((rule, outcome)),
            });

        let Some((rule, outcome)) = fired else {
            return Ok(None);
        };

        if let Some(existing) = self.dedup.existing(configuration, rule, context.current_time)? {
            return Ok(Some(existing));
        }

        let severity = outcome.severity;
        let alert = self.factory.build(configuration, rule, outcome, context)?;
        let stored = self.dedup.commit(alert, rule, context.current_time)?;
        if !stored.is_duplicate() {
            info!(
                configuration_id = %configuration.id,
                rule_id = %rule.id,
                %severity,
                "alert triggered"
            );
        }
        Ok(Some(stored.into_alert()))
    }

    /// Validates a configuration against its organization's tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription provider cannot supply limits.
    pub fn validate_configuration(&self, configuration: &AlertConfiguration) -> Result<ValidationReport> {
        let limits = self.subscriptions.limits(&configuration.organization_id)?;
        Ok(validate_configuration(configuration, &limits))
    }
}

/// Rejects configurations that cannot be evaluated meaningfully.
fn check_structure(configuration: &AlertConfiguration) -> Result<()> {
    let mut ids = HashSet::new();
    for rule in &configuration.rules {
        if !ids.insert(rule.id.as_str()) {
            return Err(evaluation_error(format!("duplicate rule id '{}'", rule.id)));
        }
        if rule.conditions.is_empty() {
            return Err(evaluation_error(format!("rule '{}' has no conditions", rule.id)));
        }
        for condition in &rule.conditions {
            if !condition.threshold.value.is_finite() {
                return Err(evaluation_error(format!(
                    "condition '{}' of rule '{}' has a non-finite threshold",
                    condition.id, rule.id
                )));
            }
            condition.time_aggregation.validate()?;
            for filter in &condition.filters {
                filter.validate()?;
            }
        }
    }
    Ok(())
}

fn evaluation_error(reason: String) -> AlertError {
    AlertError::EvaluationError { reason }
}
