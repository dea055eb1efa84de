//! Notification delivery and escalation.
//!
//! [`NotificationDeliveryService`] routes an alert, fans the sends out to the
//! channel adapters concurrently and turns every outcome, including timeouts
//! and provider errors, into a [`NotificationLog`] entry. It never mutates
//! the alert: callers append the returned entries with
//! [`AlertInstance::record_notifications`] or
//! [`AlertInstance::record_escalation`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use crate::alert::{AlertInstance, NotificationLog};
use crate::channels::{
    ChannelDeliveryAdapter, DeliveryProvider, EmailAdapter, NotificationPayload, SmsAdapter, WebhookAdapter,
};
use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::escalation::{EscalationPolicy, EscalationScheduler};
use crate::router::{DeliveryState, NotificationRouter, PlannedDelivery};
use crate::settings::{ChannelKind, NotificationSettings};
use crate::store::{AlertStore, DeliveryRecord};

/// Sends alert notifications and escalation stages.
#[derive(Debug, Clone)]
pub struct NotificationDeliveryService {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelDeliveryAdapter>>,
    router: NotificationRouter,
    store: Arc<dyn AlertStore>,
    config: DeliveryConfig,
}

impl NotificationDeliveryService {
    /// Creates a service with no adapters registered.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>, config: DeliveryConfig) -> Self {
        Self {
            adapters: HashMap::new(),
            router: NotificationRouter::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// Creates a service with the three standard adapters over the given providers.
    #[must_use]
    pub fn with_providers(
        store: Arc<dyn AlertStore>,
        config: DeliveryConfig,
        email: Arc<dyn DeliveryProvider>,
        sms: Arc<dyn DeliveryProvider>,
        webhook: Arc<dyn DeliveryProvider>,
    ) -> Self {
        let email = EmailAdapter::new(email, config.email_from.clone());
        let sms = SmsAdapter::new(sms, config.sms_max_length);
        let webhook = WebhookAdapter::new(webhook, Duration::from_millis(config.webhook_timeout_ms));
        Self::new(store, config)
            .with_adapter(Arc::new(email))
            .with_adapter(Arc::new(sms))
            .with_adapter(Arc::new(webhook))
    }

    /// Registers an adapter, replacing any adapter of the same kind.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelDeliveryAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &NotificationRouter {
        &self.router
    }

    /// Sends the initial notifications for `alert`.
    ///
    /// # Errors
    ///
    /// See [`send_alert_notifications_at`](Self::send_alert_notifications_at).
    pub async fn send_alert_notifications(
        &self,
        settings: &NotificationSettings,
        alert: &AlertInstance,
    ) -> Result<Vec<NotificationLog>> {
        self.send_alert_notifications_at(settings, alert, Utc::now()).await
    }

    /// Sends the initial notifications for `alert` as of `now`.
    ///
    /// Returns an empty list when every channel is held back. Failed sends
    /// are returned as failed entries.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` if quiet hours or a shift name an
    /// unknown timezone, or `AlertError::StoreError` if delivery history
    /// cannot be read.
    pub async fn send_alert_notifications_at(
        &self,
        settings: &NotificationSettings,
        alert: &AlertInstance,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationLog>> {
        let plan = self.router.plan(settings, alert, now)?;
        if plan.is_empty() {
            info!(
                alert_id = %alert.id,
                skipped = plan.skipped.len(),
                "no notifications routed"
            );
            return Ok(Vec::new());
        }

        let payload = NotificationPayload::from_alert(alert, None, 0);
        Ok(self.dispatch(alert, plan.deliveries, &payload, now, 0).await)
    }

    /// Runs escalation stage `stage_index` for `alert`.
    pub async fn handle_escalation(
        &self,
        alert: &AlertInstance,
        policy: &EscalationPolicy,
        stage_index: usize,
    ) -> Vec<NotificationLog> {
        self.handle_escalation_at(alert, policy, stage_index, Utc::now()).await
    }

    /// Runs escalation stage `stage_index` for `alert` as of `now`.
    ///
    /// Returns an empty list if the stage must not run: the alert is
    /// acknowledged or closed, the policy is exhausted, the stage already ran,
    /// or the auto-resolve timeout has elapsed. Entries carry escalation level
    /// `stage_index + 1` and are stamped no earlier than the alert's last
    /// log entry.
    pub async fn handle_escalation_at(
        &self,
        alert: &AlertInstance,
        policy: &EscalationPolicy,
        stage_index: usize,
        now: DateTime<Utc>,
    ) -> Vec<NotificationLog> {
        let stage = match EscalationScheduler::check_stage(alert, policy, stage_index, now) {
            Ok(stage) => stage,
            Err(reason) => {
                info!(alert_id = %alert.id, stage_index, %reason, "escalation halted");
                return Vec::new();
            }
        };

        let level = u32::try_from(stage_index + 1).unwrap_or(u32::MAX);
        let plan = NotificationRouter::plan_stage(alert, stage);
        if plan.is_empty() {
            warn!(alert_id = %alert.id, stage_index, "escalation stage has no reachable recipients");
            return Vec::new();
        }

        let payload = NotificationPayload::from_alert(alert, stage.custom_message.as_deref(), level);
        info!(
            alert_id = %alert.id,
            stage_index,
            level,
            targets = plan.deliveries.len(),
            "escalating"
        );
        self.dispatch(alert, plan.deliveries, &payload, now, level).await
    }

    /// Sends to every planned target concurrently and waits for all of them.
    async fn dispatch(
        &self,
        alert: &AlertInstance,
        mut deliveries: Vec<PlannedDelivery>,
        payload: &NotificationPayload,
        now: DateTime<Utc>,
        level: u32,
    ) -> Vec<NotificationLog> {
        let sent_at = alert.last_notified_at().map_or(now, |last| last.max(now));
        let timeout = self.config.default_timeout();

        let sends = deliveries.iter().map(|delivery| async move {
            let target = &delivery.target;
            let kind = target.kind();
            let outcome = match self.adapters.get(&kind) {
                Some(adapter) => match tokio::time::timeout(timeout, adapter.send(target, payload)).await {
                    Ok(Ok(receipt)) => Ok(receipt.message_id),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
                },
                None => Err(format!("no adapter registered for {kind}")),
            };

            let entry = match outcome {
                Ok(message_id) => NotificationLog::sent(&alert.id, kind, &target.address, sent_at, message_id),
                Err(reason) => {
                    warn!(
                        alert_id = %alert.id,
                        channel = %kind,
                        channel_id = %target.channel_id,
                        %reason,
                        "notification failed"
                    );
                    NotificationLog::failed(&alert.id, kind, &target.address, sent_at, reason)
                }
            };
            entry.with_channel_id(&target.channel_id).with_escalation_level(level)
        });

        let entries = join_all(sends).await;

        for (delivery, entry) in deliveries.iter_mut().zip(&entries) {
            let next = if entry.is_sent() {
                DeliveryState::Delivered
            } else {
                DeliveryState::Failed
            };
            match delivery.state.transition(next) {
                Ok(state) => delivery.state = state,
                Err(e) => warn!(alert_id = %alert.id, error = %e, "unexpected delivery state"),
            }
            if entry.is_sent() {
                self.count_delivery(alert, &delivery.recipient_key, entry);
            }
        }

        let sent = entries.iter().filter(|e| e.is_sent()).count();
        info!(
            alert_id = %alert.id,
            level,
            sent,
            failed = entries.len() - sent,
            "notifications dispatched"
        );
        entries
    }

    fn count_delivery(&self, alert: &AlertInstance, recipient_key: &str, entry: &NotificationLog) {
        let record = DeliveryRecord {
            recipient_key: recipient_key.to_string(),
            alert_id: alert.id.clone(),
            configuration_id: alert.configuration_id.clone(),
            rule_id: alert.rule_id.clone(),
            sent_at: entry.sent_at,
        };
        if let Err(e) = self.store.record_delivery(record) {
            warn!(alert_id = %alert.id, recipient_key, error = %e, "failed to record delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::fixtures::alert;
    use crate::alert::{is_chronological, AlertStatus, DeliveryStatus};
    use crate::channels::fakes::{FailingProvider, RecordingProvider, StallingProvider};
    use crate::escalation::EscalationStage;
    use crate::quiet_hours::QuietHours;
    use crate::schedule::ClockTime;
    use crate::settings::{ChannelConfig, ChannelSettings, FrequencyLimits, Recipient};
    use crate::store::InMemoryAlertStore;
    use crate::types::AlertSeverity;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap()
    }

    fn settings() -> NotificationSettings {
        NotificationSettings::default()
            .with_channel(ChannelSettings::new("email", ChannelConfig::email()))
            .with_channel(ChannelSettings::new("sms", ChannelConfig::sms()))
            .with_channel(ChannelSettings::new("hook", ChannelConfig::webhook("https://hooks.example.com/a")))
            .with_recipient(
                Recipient::new("fm", "Facility manager")
                    .with_email("fm@example.com")
                    .with_phone("+15550100"),
            )
    }

    fn service_with(
        store: Arc<InMemoryAlertStore>,
        email: Arc<dyn DeliveryProvider>,
        sms: Arc<dyn DeliveryProvider>,
        webhook: Arc<dyn DeliveryProvider>,
    ) -> NotificationDeliveryService {
        NotificationDeliveryService::with_providers(store, DeliveryConfig::default(), email, sms, webhook)
    }

    fn recording_service() -> (NotificationDeliveryService, Arc<InMemoryAlertStore>) {
        let store = Arc::new(InMemoryAlertStore::new());
        let service = service_with(
            store.clone(),
            Arc::new(RecordingProvider::default()),
            Arc::new(RecordingProvider::default()),
            Arc::new(RecordingProvider::default()),
        );
        (service, store)
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(
            vec![
                EscalationStage::new(
                    1,
                    5,
                    vec![Recipient::new("lead", "Lead").with_phone("+15550111")],
                    vec![ChannelKind::Sms],
                )
                .with_message("Unacknowledged for 5 minutes"),
                EscalationStage::new(
                    2,
                    10,
                    vec![Recipient::new("mgr", "Manager").with_email("mgr@example.com")],
                    vec![ChannelKind::Email],
                ),
            ],
            2,
        )
    }

    mod send_tests {
        use super::*;

        #[tokio::test]
        async fn sends_every_routed_target() {
            let (service, store) = recording_service();
            let a = alert(AlertSeverity::High, noon());

            let log = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();

            assert_eq!(log.len(), 3);
            assert!(log.iter().all(NotificationLog::is_sent));
            assert!(log.iter().all(|e| e.sent_at == noon() && e.escalation_level == 0));
            assert_eq!(
                store.deliveries_since("fm", noon() - ChronoDuration::hours(1)).unwrap().len(),
                2
            );
        }

        #[tokio::test]
        async fn one_failing_channel_does_not_block_others() {
            let store = Arc::new(InMemoryAlertStore::new());
            let service = service_with(
                store,
                Arc::new(FailingProvider),
                Arc::new(RecordingProvider::default()),
                Arc::new(RecordingProvider::default()),
            );
            let a = alert(AlertSeverity::High, noon());

            let log = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();

            let failed: Vec<_> = log.iter().filter(|e| e.status == DeliveryStatus::Failed).collect();
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].channel, ChannelKind::Email);
            assert!(failed[0].failure_reason.as_deref().unwrap().contains("provider outage"));
            assert!(log.iter().any(|e| e.channel == ChannelKind::Sms && e.is_sent()));
            assert!(log.iter().any(|e| e.channel == ChannelKind::Webhook && e.is_sent()));
        }

        #[tokio::test(start_paused = true)]
        async fn stalled_channel_times_out() {
            let store = Arc::new(InMemoryAlertStore::new());
            let service = service_with(
                store,
                Arc::new(RecordingProvider::default()),
                Arc::new(StallingProvider),
                Arc::new(StallingProvider),
            );
            let a = alert(AlertSeverity::High, noon());

            let log = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();

            assert_eq!(log.len(), 3);
            let email = log.iter().find(|e| e.channel == ChannelKind::Email).unwrap();
            assert!(email.is_sent());
            let sms = log.iter().find(|e| e.channel == ChannelKind::Sms).unwrap();
            assert!(sms.failure_reason.as_deref().unwrap().contains("timed out"));
            let hook = log.iter().find(|e| e.channel == ChannelKind::Webhook).unwrap();
            assert!(hook.failure_reason.as_deref().unwrap().contains("timed out"));
        }

        #[tokio::test]
        async fn missing_adapter_is_a_failed_entry() {
            let store = Arc::new(InMemoryAlertStore::new());
            let service = NotificationDeliveryService::new(store, DeliveryConfig::default()).with_adapter(Arc::new(
                EmailAdapter::new(Arc::new(RecordingProvider::default()), "a@example.com"),
            ));
            let a = alert(AlertSeverity::High, noon());

            let log = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();
            assert_eq!(log.iter().filter(|e| e.is_sent()).count(), 1);
            assert_eq!(log.iter().filter(|e| !e.is_sent()).count(), 2);
        }

        #[tokio::test]
        async fn quiet_hours_hold_back_medium_but_not_critical() {
            let (service, _) = recording_service();
            let night = Utc.with_ymd_and_hms(2024, 3, 12, 23, 0, 0).unwrap();
            let s = settings().with_quiet_hours(QuietHours::new(
                ClockTime::from_hm(22, 0).unwrap(),
                ClockTime::from_hm(7, 0).unwrap(),
                "UTC",
            ));

            let medium = service
                .send_alert_notifications_at(&s, &alert(AlertSeverity::Medium, night), night)
                .await
                .unwrap();
            assert!(medium.is_empty());

            let critical = service
                .send_alert_notifications_at(&s, &alert(AlertSeverity::Critical, night), night)
                .await
                .unwrap();
            assert!(critical.iter().any(NotificationLog::is_sent));
        }

        #[tokio::test]
        async fn deliveries_feed_frequency_limits() {
            let (service, _) = recording_service();
            let s = settings().with_frequency_limits(FrequencyLimits {
                max_alerts_per_hour: Some(1),
                ..FrequencyLimits::default()
            });

            let first = service
                .send_alert_notifications_at(&s, &alert(AlertSeverity::High, noon()), noon())
                .await
                .unwrap();
            assert_eq!(first.len(), 3);

            let later = noon() + ChronoDuration::minutes(5);
            let second = service
                .send_alert_notifications_at(&s, &alert(AlertSeverity::High, later), later)
                .await
                .unwrap();
            // the webhook is not a recipient and is never rate limited
            assert_eq!(second.len(), 1);
            assert_eq!(second[0].channel, ChannelKind::Webhook);
        }
    }

    mod escalation_tests {
        use super::*;

        #[tokio::test]
        async fn stages_compose_a_chronological_log() {
            let (service, _) = recording_service();
            let mut a = alert(AlertSeverity::High, noon());
            let p = policy();

            let initial = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();
            a.record_notifications(initial).unwrap();

            let stage0 = service
                .handle_escalation_at(&a, &p, 0, noon() + ChronoDuration::minutes(5))
                .await;
            assert_eq!(stage0.len(), 1);
            assert_eq!(stage0[0].escalation_level, 1);
            a.record_escalation(1, stage0).unwrap();

            let stage1 = service
                .handle_escalation_at(&a, &p, 1, noon() + ChronoDuration::minutes(30))
                .await;
            assert_eq!(stage1.len(), 1);
            a.record_escalation(2, stage1).unwrap();

            assert_eq!(a.escalation_level, 2);
            assert!(is_chronological(&a.notification_log));
        }

        #[tokio::test]
        async fn stamps_never_precede_the_log_tail() {
            let (service, _) = recording_service();
            let mut a = alert(AlertSeverity::High, noon());
            let initial = service.send_alert_notifications_at(&settings(), &a, noon()).await.unwrap();
            a.record_notifications(initial).unwrap();

            let early = noon() - ChronoDuration::minutes(1);
            let stage0 = service.handle_escalation_at(&a, &policy(), 0, early).await;
            assert!(stage0.iter().all(|e| e.sent_at == noon()));
        }

        #[tokio::test]
        async fn stage_uses_custom_message() {
            let provider = Arc::new(RecordingProvider::default());
            let store = Arc::new(InMemoryAlertStore::new());
            let service = service_with(
                store,
                Arc::new(RecordingProvider::default()),
                provider.clone(),
                Arc::new(RecordingProvider::default()),
            );

            service
                .handle_escalation_at(&alert(AlertSeverity::High, noon()), &policy(), 0, noon())
                .await;

            let sent = provider.sent.lock();
            assert_eq!(sent.len(), 1);
            assert!(sent[0].body.contains("Unacknowledged for 5 minutes"));
        }

        #[tokio::test]
        async fn acknowledged_alert_is_a_no_op() {
            let (service, _) = recording_service();
            let mut a = alert(AlertSeverity::High, noon());
            a.acknowledge("fm", noon() + ChronoDuration::minutes(1)).unwrap();
            assert_eq!(a.status, AlertStatus::Acknowledged);

            let log = service.handle_escalation_at(&a, &policy(), 0, noon()).await;
            assert!(log.is_empty());
        }

        #[tokio::test]
        async fn exhausted_policy_is_a_no_op() {
            let (service, _) = recording_service();
            let mut a = alert(AlertSeverity::High, noon());
            a.escalation_level = 2;

            let log = service.handle_escalation_at(&a, &policy(), 2, noon()).await;
            assert!(log.is_empty());
        }
    }
}
