//! Cooldown-based deduplication.
//!
//! A rule that fires again within its cooldown reuses the alert it raised
//! before. Callers see the same alert id; this is not an error. Resolved and
//! false-positive alerts are closed and never reused.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::alert::AlertInstance;
use crate::error::Result;
use crate::store::{AlertStore, StoreOutcome};
use crate::types::{AlertConfiguration, AlertRule};

/// Checks fired rules against recently triggered alerts.
#[derive(Debug, Clone)]
pub struct DeduplicationGuard {
    store: Arc<dyn AlertStore>,
}

impl DeduplicationGuard {
    /// Creates a guard over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Returns the start of the cooldown for `rule` at `now`, or `None` if
    /// the rule does not deduplicate.
    #[must_use]
    pub fn cooldown_start(rule: &AlertRule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (rule.suppress_duplicates && rule.cooldown_period_minutes > 0)
            .then(|| now - Duration::minutes(i64::from(rule.cooldown_period_minutes)))
    }

    /// Returns the alert a fresh trigger of `rule` would duplicate, if any.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    pub fn existing(
        &self,
        configuration: &AlertConfiguration,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>> {
        let Some(since) = Self::cooldown_start(rule, now) else {
            return Ok(None);
        };
        let existing = self
            .store
            .recent_alerts(&configuration.id, Some(&rule.id), since)?
            .into_iter()
            .filter(|a| !a.status.is_terminal())
            .max_by_key(|a| a.triggered_at);

        if let Some(alert) = &existing {
            debug!(
                configuration_id = %configuration.id,
                rule_id = %rule.id,
                alert_id = %alert.id,
                "duplicate within cooldown"
            );
        }
        Ok(existing)
    }

    /// Stores a freshly built alert, unless another evaluation stored one
    /// for the same rule within the cooldown first.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    pub fn commit(&self, alert: AlertInstance, rule: &AlertRule, now: DateTime<Utc>) -> Result<StoreOutcome> {
        match Self::cooldown_start(rule, now) {
            Some(since) => self.store.insert_unless_recent(alert, since),
            None => {
                self.store.insert(alert.clone())?;
                Ok(StoreOutcome::Inserted(alert))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::fixtures::alert;
    use crate::store::InMemoryAlertStore;
    use crate::types::{AlertSeverity, ComparisonOperator, Condition};
    use chrono::TimeZone;
    use sitewatch_metrics::{AggregationFunction, MetricSelector, TimeAggregation};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap()
    }

    fn rule(cooldown: u32, suppress: bool) -> AlertRule {
        AlertRule::builder("Energy")
            .id("rule-1")
            .cooldown_minutes(cooldown)
            .suppress_duplicates(suppress)
            .condition(Condition::new(
                MetricSelector::new("energy").unwrap(),
                ComparisonOperator::GreaterThan,
                1.0,
                TimeAggregation::new(AggregationFunction::Sum, 60, 1).unwrap(),
            ))
            .build()
            .unwrap()
    }

    fn configuration(rule: AlertRule) -> AlertConfiguration {
        let mut config = AlertConfiguration::new("HQ", "u", "o", vec![rule]);
        config.id = "config-1".to_string();
        config
    }

    #[test]
    fn finds_alert_inside_cooldown() {
        let previous = alert(AlertSeverity::High, now() - Duration::minutes(10));
        let store = Arc::new(InMemoryAlertStore::with_alerts(vec![previous.clone()]));
        let guard = DeduplicationGuard::new(store);

        let r = rule(30, true);
        let existing = guard.existing(&configuration(r.clone()), &r, now()).unwrap();
        assert_eq!(existing.map(|a| a.id), Some(previous.id));
    }

    #[test]
    fn closed_alert_inside_cooldown_is_not_reused() {
        let mut resolved = alert(AlertSeverity::High, now() - Duration::minutes(10));
        resolved.resolve(now() - Duration::minutes(5), None).unwrap();
        let mut dismissed = alert(AlertSeverity::High, now() - Duration::minutes(8));
        dismissed.mark_false_positive(now() - Duration::minutes(4), None).unwrap();
        let store = Arc::new(InMemoryAlertStore::with_alerts(vec![resolved, dismissed]));
        let guard = DeduplicationGuard::new(store.clone());

        let r = rule(30, true);
        assert!(guard.existing(&configuration(r.clone()), &r, now()).unwrap().is_none());
        let outcome = guard.commit(alert(AlertSeverity::High, now()), &r, now()).unwrap();
        assert!(!outcome.is_duplicate());
        assert_eq!(store.alert_count(), 3);
    }

    #[test]
    fn acknowledged_alert_inside_cooldown_is_reused() {
        let mut previous = alert(AlertSeverity::High, now() - Duration::minutes(10));
        previous.acknowledge("ops", now() - Duration::minutes(5)).unwrap();
        let guard = DeduplicationGuard::new(Arc::new(InMemoryAlertStore::with_alerts(vec![previous.clone()])));

        let r = rule(30, true);
        let existing = guard.existing(&configuration(r.clone()), &r, now()).unwrap();
        assert_eq!(existing.map(|a| a.id), Some(previous.id));
    }

    #[test]
    fn ignores_alert_outside_cooldown() {
        let previous = alert(AlertSeverity::High, now() - Duration::minutes(45));
        let guard = DeduplicationGuard::new(Arc::new(InMemoryAlertStore::with_alerts(vec![previous])));

        let r = rule(30, true);
        assert!(guard.existing(&configuration(r.clone()), &r, now()).unwrap().is_none());
    }

    #[test]
    fn suppression_disabled_never_dedups() {
        let previous = alert(AlertSeverity::High, now() - Duration::minutes(1));
        let guard = DeduplicationGuard::new(Arc::new(InMemoryAlertStore::with_alerts(vec![previous])));

        let r = rule(30, false);
        assert!(guard.existing(&configuration(r.clone()), &r, now()).unwrap().is_none());
        let outcome = guard.commit(alert(AlertSeverity::High, now()), &r, now()).unwrap();
        assert!(!outcome.is_duplicate());
    }

    #[test]
    fn zero_cooldown_never_dedups() {
        assert!(DeduplicationGuard::cooldown_start(&rule(0, true), now()).is_none());
    }

    #[test]
    fn commit_returns_racing_alert() {
        let store = Arc::new(InMemoryAlertStore::new());
        let guard = DeduplicationGuard::new(store.clone());
        let r = rule(30, true);

        let first = guard.commit(alert(AlertSeverity::High, now()), &r, now()).unwrap();
        let second = guard.commit(alert(AlertSeverity::High, now()), &r, now()).unwrap();

        assert!(second.is_duplicate());
        assert_eq!(first.into_alert().id, second.into_alert().id);
        assert_eq!(store.alert_count(), 1);
    }
}
