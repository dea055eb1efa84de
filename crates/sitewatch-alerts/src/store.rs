//! The persistence collaborator.
//!
//! Dedup and rate limiting read and write alert history only through
//! [`AlertStore`]. Implementations must make
//! [`AlertStore::insert_unless_recent`] atomic per configuration and rule, so
//! concurrent evaluations cannot both create an alert for the same rule.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::alert::AlertInstance;
use crate::error::{AlertError, Result};

/// Outcome of [`AlertStore::insert_unless_recent`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// The alert was new and has been stored.
    Inserted(AlertInstance),
    /// A recent alert for the same rule already existed; it is returned unchanged.
    Existing(AlertInstance),
}

impl StoreOutcome {
    /// Returns the stored or existing alert.
    #[must_use]
    pub fn into_alert(self) -> AlertInstance {
        match self {
            Self::Inserted(alert) | Self::Existing(alert) => alert,
        }
    }

    /// Returns true if an existing alert was returned.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

/// One notification counted against a recipient's limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Recipient identifier the limit applies to.
    pub recipient_key: String,
    /// The alert delivered.
    pub alert_id: String,
    /// Configuration of the alert.
    pub configuration_id: String,
    /// Rule of the alert.
    pub rule_id: String,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Returns the key identifying "similar" alerts.
    #[must_use]
    pub fn similarity_key(&self) -> (&str, &str) {
        (&self.configuration_id, &self.rule_id)
    }
}

/// Alert history used for dedup, related alerts and frequency limits.
pub trait AlertStore: Send + Sync + fmt::Debug {
    /// Returns alerts of a configuration (optionally a single rule) triggered at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn recent_alerts(
        &self,
        configuration_id: &str,
        rule_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertInstance>>;

    /// Stores `alert` unless a non-terminal alert for the same configuration
    /// and rule was triggered at or after `since`, in which case that alert is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn insert_unless_recent(&self, alert: AlertInstance, since: DateTime<Utc>) -> Result<StoreOutcome>;

    /// Stores or replaces an alert.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn insert(&self, alert: AlertInstance) -> Result<()>;

    /// Fetches an alert by id.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn get(&self, alert_id: &str) -> Result<Option<AlertInstance>>;

    /// Counts a delivery against a recipient.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn record_delivery(&self, record: DeliveryRecord) -> Result<()>;

    /// Returns deliveries to a recipient at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::StoreError` if the store is unavailable.
    fn deliveries_since(&self, recipient_key: &str, since: DateTime<Utc>) -> Result<Vec<DeliveryRecord>>;
}

/// Simple in-memory alert store.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<String, AlertInstance>>,
    deliveries: RwLock<HashMap<String, Vec<DeliveryRecord>>>,
}

impl InMemoryAlertStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with alerts.
    #[must_use]
    pub fn with_alerts(alerts: impl IntoIterator<Item = AlertInstance>) -> Self {
        let store = Self::new();
        {
            let mut map = store.alerts.write();
            for alert in alerts {
                map.insert(alert.id.clone(), alert);
            }
        }
        store
    }

    /// Returns the number of stored alerts.
    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }

    /// Returns all stored alerts, oldest first.
    #[must_use]
    pub fn all_alerts(&self) -> Vec<AlertInstance> {
        let mut alerts: Vec<AlertInstance> = self.alerts.read().values().cloned().collect();
        alerts.sort_by_key(|a| a.triggered_at);
        alerts
    }
}

fn is_recent_match(
    alert: &AlertInstance,
    configuration_id: &str,
    rule_id: Option<&str>,
    since: DateTime<Utc>,
) -> bool {
    alert.configuration_id == configuration_id
        && rule_id.is_none_or(|r| alert.rule_id == r)
        && alert.triggered_at >= since
}

impl AlertStore for InMemoryAlertStore {
    fn recent_alerts(
        &self,
        configuration_id: &str,
        rule_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertInstance>> {
        let mut alerts: Vec<AlertInstance> = self
            .alerts
            .read()
            .values()
            .filter(|a| is_recent_match(a, configuration_id, rule_id, since))
            .cloned()
            .collect();
        alerts.sort_by_key(|a| a.triggered_at);
        Ok(alerts)
    }

    fn insert_unless_recent(&self, alert: AlertInstance, since: DateTime<Utc>) -> Result<StoreOutcome> {
        let mut alerts = self.alerts.write();
        let existing = alerts
            .values()
            .filter(|a| is_recent_match(a, &alert.configuration_id, Some(&alert.rule_id), since))
            .filter(|a| !a.status.is_terminal())
            .max_by_key(|a| a.triggered_at)
            .cloned();

        if let Some(existing) = existing {
            return Ok(StoreOutcome::Existing(existing));
        }

        alerts.insert(alert.id.clone(), alert.clone());
        Ok(StoreOutcome::Inserted(alert))
    }

    fn insert(&self, alert: AlertInstance) -> Result<()> {
        if alert.id.is_empty() {
            return Err(AlertError::StoreError {
                reason: "alert id cannot be empty".to_string(),
            });
        }
        self.alerts.write().insert(alert.id.clone(), alert);
        Ok(())
    }

    fn get(&self, alert_id: &str) -> Result<Option<AlertInstance>> {
        Ok(self.alerts.read().get(alert_id).cloned())
    }

    fn record_delivery(&self, record: DeliveryRecord) -> Result<()> {
        self.deliveries
            .write()
            .entry(record.recipient_key.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn deliveries_since(&self, recipient_key: &str, since: DateTime<Utc>) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .deliveries
            .read()
            .get(recipient_key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.sent_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
