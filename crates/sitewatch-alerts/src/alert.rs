//! Alert instances and their append-only audit trail.
//!
//! An [`AlertInstance`] is built once by the factory. After that, its owning
//! workflow may only append: acknowledgment, resolution, escalation level and
//! notification log entries. Timestamps already set are never rewritten, and
//! the notification log stays sorted by `sent_at`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitewatch_metrics::{EvaluationWindow, SensorReading};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AlertError, Result};
use crate::settings::ChannelKind;
use crate::types::{AlertSeverity, ComparisonOperator, OccupancyData, SystemStatus, WeatherData};

/// The lifecycle status of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Raised and not yet handled.
    #[default]
    Triggered,
    /// Someone is looking at it.
    Acknowledged,
    /// The underlying condition was dealt with.
    Resolved,
    /// Raised in error.
    FalsePositive,
}

impl AlertStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::FalsePositive => "false_positive",
        }
    }

    /// Returns true if the alert is closed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::FalsePositive)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The evaluated outcome of one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValueResult {
    /// Condition this result belongs to.
    pub condition_id: String,
    /// Metric type of the condition.
    pub metric_type: String,
    /// Aggregated value, absent when not evaluable.
    pub value: Option<f64>,
    /// Threshold compared against.
    pub threshold: f64,
    /// Operator used.
    pub operator: ComparisonOperator,
    /// Whether the condition held.
    pub met: bool,
    /// Whether enough data was present to decide.
    pub evaluable: bool,
    /// Readings that contributed.
    pub data_points: usize,
    /// Classifier confidence for anomaly conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_confidence: Option<f64>,
    /// The aggregation window.
    pub evaluation_window: EvaluationWindow,
    /// Human-readable annotations.
    #[serde(default)]
    pub contributing_factors: Vec<String>,
}

/// Snapshot of the surroundings when the alert fired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Weather at trigger time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherData>,
    /// Occupancy at trigger time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<OccupancyData>,
    /// Systems status at trigger time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_status: Option<SystemStatus>,
    /// Readings that fed the fired conditions.
    #[serde(default)]
    pub sensor_data: Vec<SensorReading>,
    /// Ids of recent alerts from the same configuration.
    #[serde(default)]
    pub related_alerts: Vec<String>,
}

/// Delivery outcome of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// The provider accepted the message.
    Sent,
    /// The send failed or timed out.
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An immutable record of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLog {
    /// Entry id.
    pub id: String,
    /// The alert notified about.
    pub alert_id: String,
    /// Channel kind used.
    pub channel: ChannelKind,
    /// Configured channel id.
    #[serde(default)]
    pub channel_id: String,
    /// Address the message went to.
    pub recipient: String,
    /// Dispatch time.
    pub sent_at: DateTime<Utc>,
    /// Outcome.
    pub status: DeliveryStatus,
    /// Provider-assigned id on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    /// Failure reason on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Escalation level this send belongs to (0 for the initial send).
    #[serde(default)]
    pub escalation_level: u32,
}

impl NotificationLog {
    /// Creates a successful entry.
    #[must_use]
    pub fn sent(
        alert_id: impl Into<String>,
        channel: ChannelKind,
        recipient: impl Into<String>,
        sent_at: DateTime<Utc>,
        provider_message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.into(),
            channel,
            channel_id: channel.as_str().to_string(),
            recipient: recipient.into(),
            sent_at,
            status: DeliveryStatus::Sent,
            provider_message_id: Some(provider_message_id.into()),
            failure_reason: None,
            escalation_level: 0,
        }
    }

    /// Creates a failed entry.
    #[must_use]
    pub fn failed(
        alert_id: impl Into<String>,
        channel: ChannelKind,
        recipient: impl Into<String>,
        sent_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.into(),
            channel,
            channel_id: channel.as_str().to_string(),
            recipient: recipient.into(),
            sent_at,
            status: DeliveryStatus::Failed,
            provider_message_id: None,
            failure_reason: Some(reason.into()),
            escalation_level: 0,
        }
    }

    /// Sets the configured channel id.
    #[must_use]
    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Sets the escalation level.
    #[must_use]
    pub const fn with_escalation_level(mut self, level: u32) -> Self {
        self.escalation_level = level;
        self
    }

    /// Returns true if the send succeeded.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

/// A raised alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    /// Unique identifier.
    pub id: String,
    /// Configuration that raised it.
    pub configuration_id: String,
    /// Rule that fired.
    pub rule_id: String,
    /// Title, from the configuration name.
    pub title: String,
    /// Description, from the rule.
    pub description: String,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// Severity.
    pub severity: AlertSeverity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// One result per condition, in evaluation order.
    pub metric_values: Vec<MetricValueResult>,
    /// Snapshot of the surroundings.
    #[serde(default)]
    pub context: AlertContext,
    /// Escalation stages already run.
    #[serde(default)]
    pub escalation_level: u32,
    /// Held back by a maintenance window.
    #[serde(default)]
    pub suppressed: bool,
    /// Delivery attempts, sorted by `sent_at`.
    #[serde(default)]
    pub notification_log: Vec<NotificationLog>,
    /// When the alert fired.
    pub triggered_at: DateTime<Utc>,
    /// When the alert was acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Who acknowledged it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    /// When the alert was resolved or marked false positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Notes left on resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl AlertInstance {
    /// Returns the `sent_at` of the newest log entry.
    #[must_use]
    pub fn last_notified_at(&self) -> Option<DateTime<Utc>> {
        self.notification_log.last().map(|entry| entry.sent_at)
    }

    /// Returns true if escalation may still run.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Triggered
    }

    /// Acknowledges a triggered alert.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTransition` unless the alert is triggered.
    pub fn acknowledge(&mut self, by: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        if self.status != AlertStatus::Triggered || self.acknowledged_at.is_some() {
            return Err(self.transition_error(format!("cannot acknowledge a {} alert", self.status)));
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(at);
        self.acknowledged_by = Some(by.into());
        debug!(alert_id = %self.id, "alert acknowledged");
        Ok(())
    }

    /// Resolves an open alert.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTransition` if the alert is already closed.
    pub fn resolve(&mut self, at: DateTime<Utc>, notes: Option<String>) -> Result<()> {
        self.close(AlertStatus::Resolved, at, notes)
    }

    /// Marks an open alert as a false positive.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTransition` if the alert is already closed.
    pub fn mark_false_positive(&mut self, at: DateTime<Utc>, notes: Option<String>) -> Result<()> {
        self.close(AlertStatus::FalsePositive, at, notes)
    }

    fn close(&mut self, status: AlertStatus, at: DateTime<Utc>, notes: Option<String>) -> Result<()> {
        if self.status.is_terminal() || self.resolved_at.is_some() {
            return Err(self.transition_error(format!("cannot close a {} alert", self.status)));
        }
        if at < self.triggered_at {
            return Err(self.transition_error("closed before it was triggered".to_string()));
        }
        self.status = status;
        self.resolved_at = Some(at);
        self.resolution_notes = notes;
        debug!(alert_id = %self.id, status = %status, "alert closed");
        Ok(())
    }

    /// Appends delivery entries, keeping the log sorted by `sent_at`.
    ///
    /// Either all entries are appended or none.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::LogOrdering` if an entry is older than the entry
    /// before it, or belongs to another alert.
    pub fn record_notifications(&mut self, entries: Vec<NotificationLog>) -> Result<()> {
        let mut previous = self.last_notified_at();
        for entry in &entries {
            if entry.alert_id != self.id {
                return Err(AlertError::LogOrdering {
                    alert_id: self.id.clone(),
                    reason: format!("entry {} belongs to alert {}", entry.id, entry.alert_id),
                });
            }
            if previous.is_some_and(|p| entry.sent_at < p) {
                return Err(AlertError::LogOrdering {
                    alert_id: self.id.clone(),
                    reason: format!("entry {} sent at {} precedes the log tail", entry.id, entry.sent_at),
                });
            }
            previous = Some(entry.sent_at);
        }
        self.notification_log.extend(entries);
        Ok(())
    }

    /// Records an escalation stage: raises the level and appends its entries.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTransition` if `level` does not increase,
    /// or `AlertError::LogOrdering` if the entries are out of order.
    pub fn record_escalation(&mut self, level: u32, entries: Vec<NotificationLog>) -> Result<()> {
        if level <= self.escalation_level {
            return Err(self.transition_error(format!(
                "escalation level {level} does not exceed current level {}",
                self.escalation_level
            )));
        }
        self.record_notifications(entries)?;
        self.escalation_level = level;
        Ok(())
    }

    fn transition_error(&self, reason: String) -> AlertError {
        AlertError::InvalidTransition {
            id: self.id.clone(),
            reason,
        }
    }
}

/// Returns true if `log` is non-decreasing in `sent_at`.
#[must_use]
pub fn is_chronological(log: &[NotificationLog]) -> bool {
    log.windows(2).all(|pair| pair[0].sent_at <= pair[1].sent_at)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A triggered alert with no metric values.
    pub fn alert(severity: AlertSeverity, triggered_at: DateTime<Utc>) -> AlertInstance {
        AlertInstance {
            id: Uuid::new_v4().to_string(),
            configuration_id: "config-1".to_string(),
            rule_id: "rule-1".to_string(),
            title: "HQ energy".to_string(),
            description: "Energy above budget".to_string(),
            status: AlertStatus::Triggered,
            severity,
            confidence: 0.95,
            metric_values: Vec::new(),
            context: AlertContext::default(),
            escalation_level: 0,
            suppressed: false,
            notification_log: Vec::new(),
            triggered_at,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolution_notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::alert;
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap()
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn acknowledge_then_resolve() {
            let mut a = alert(AlertSeverity::High, t0());
            a.acknowledge("ops@example.com", t0() + Duration::minutes(5))
                .unwrap();
            assert_eq!(a.status, AlertStatus::Acknowledged);
            assert_eq!(a.acknowledged_by.as_deref(), Some("ops@example.com"));

            a.resolve(t0() + Duration::minutes(30), Some("reset chiller".to_string()))
                .unwrap();
            assert_eq!(a.status, AlertStatus::Resolved);
            assert!(a.resolved_at.is_some());
        }

        #[test]
        fn acknowledge_twice_fails() {
            let mut a = alert(AlertSeverity::High, t0());
            a.acknowledge("ops", t0()).unwrap();
            let err = a.acknowledge("someone-else", t0()).unwrap_err();
            assert!(matches!(err, AlertError::InvalidTransition { .. }));
            assert_eq!(a.acknowledged_by.as_deref(), Some("ops"));
        }

        #[test]
        fn resolved_timestamp_not_rewritten() {
            let mut a = alert(AlertSeverity::Low, t0());
            let first = t0() + Duration::minutes(1);
            a.resolve(first, None).unwrap();
            assert!(a.mark_false_positive(t0() + Duration::minutes(2), None).is_err());
            assert_eq!(a.resolved_at, Some(first));
        }

        #[test]
        fn resolve_without_acknowledge() {
            let mut a = alert(AlertSeverity::Low, t0());
            a.mark_false_positive(t0() + Duration::minutes(1), Some("sensor glitch".to_string()))
                .unwrap();
            assert_eq!(a.status, AlertStatus::FalsePositive);
            assert!(a.status.is_terminal());
        }

        #[test]
        fn close_before_trigger_rejected() {
            let mut a = alert(AlertSeverity::Low, t0());
            assert!(a.resolve(t0() - Duration::minutes(1), None).is_err());
        }
    }

    mod log_tests {
        use super::*;

        fn entry(a: &AlertInstance, at: DateTime<Utc>) -> NotificationLog {
            NotificationLog::sent(&a.id, ChannelKind::Email, "ops@example.com", at, "msg-1")
        }

        #[test]
        fn appends_in_order() {
            let mut a = alert(AlertSeverity::High, t0());
            let entries = vec![entry(&a, t0()), entry(&a, t0() + Duration::seconds(1))];
            a.record_notifications(entries).unwrap();
            assert_eq!(a.notification_log.len(), 2);
            assert!(is_chronological(&a.notification_log));
        }

        #[test]
        fn rejects_out_of_order_append_atomically() {
            let mut a = alert(AlertSeverity::High, t0());
            a.record_notifications(vec![entry(&a, t0() + Duration::minutes(5))])
                .unwrap();

            let late = vec![
                entry(&a, t0() + Duration::minutes(6)),
                entry(&a, t0() + Duration::minutes(1)),
            ];
            let err = a.record_notifications(late).unwrap_err();
            assert!(matches!(err, AlertError::LogOrdering { .. }));
            assert_eq!(a.notification_log.len(), 1);
        }

        #[test]
        fn rejects_foreign_entries() {
            let mut a = alert(AlertSeverity::High, t0());
            let other = alert(AlertSeverity::High, t0());
            assert!(a.record_notifications(vec![entry(&other, t0())]).is_err());
        }

        #[test]
        fn escalation_level_must_increase() {
            let mut a = alert(AlertSeverity::High, t0());
            a.record_escalation(1, vec![entry(&a, t0())]).unwrap();
            assert_eq!(a.escalation_level, 1);
            assert!(a.record_escalation(1, Vec::new()).is_err());
            a.record_escalation(2, Vec::new()).unwrap();
            assert_eq!(a.escalation_level, 2);
        }

        #[test]
        fn failed_entry_carries_reason() {
            let e = NotificationLog::failed("a-1", ChannelKind::Sms, "+15550100", t0(), "timeout");
            assert!(!e.is_sent());
            assert_eq!(e.failure_reason.as_deref(), Some("timeout"));
            assert!(e.provider_message_id.is_none());
        }
    }

    proptest! {
        #[test]
        fn accepted_appends_stay_chronological(offsets in proptest::collection::vec(0i64..10_000, 0..20)) {
            let mut a = alert(AlertSeverity::Medium, t0());
            for offset in offsets {
                let e = NotificationLog::sent(&a.id, ChannelKind::Webhook, "hook", t0() + Duration::seconds(offset), "m");
                let _ = a.record_notifications(vec![e]);
            }
            prop_assert!(is_chronological(&a.notification_log));
        }
    }
}
