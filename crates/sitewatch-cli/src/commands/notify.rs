//! Initial notification command implementation.

use std::io::Write;

use chrono::{DateTime, Utc};
use sitewatch_alerts::{AlertInstance, NotificationDeliveryService, NotificationSettings};

use crate::error::CliError;
use crate::output::{DeliveryReport, OutputFormat};

/// Handler for `notify`.
pub struct NotifyCommand<'a> {
    service: &'a NotificationDeliveryService,
}

impl<'a> NotifyCommand<'a> {
    /// Creates a new notify command handler.
    #[must_use]
    pub const fn new(service: &'a NotificationDeliveryService) -> Self {
        Self { service }
    }

    /// Routes and sends the initial notifications for `alert`.
    ///
    /// # Errors
    ///
    /// Returns error if routing fails (for example an unknown quiet-hours
    /// timezone) or the report cannot be written. Failed sends are reported,
    /// not returned as errors.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        settings: &NotificationSettings,
        alert: &AlertInstance,
        now: DateTime<Utc>,
    ) -> Result<(), CliError> {
        let notifications = self
            .service
            .send_alert_notifications_at(settings, alert, now)
            .await?;

        format.write(out, &DeliveryReport::new(&alert.id, 0, notifications))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use sitewatch_alerts::{
        AlertSeverity, ChannelConfig, ChannelSettings, DeliveryConfig, InMemoryAlertStore,
        LogProvider, QuietHours, Recipient,
    };

    use crate::cli::Format;
    use crate::commands::test_support::alert;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap()
    }

    fn service() -> NotificationDeliveryService {
        let log = Arc::new(LogProvider::default());
        NotificationDeliveryService::with_providers(
            Arc::new(InMemoryAlertStore::new()),
            DeliveryConfig::default(),
            log.clone(),
            log.clone(),
            log,
        )
    }

    fn settings() -> NotificationSettings {
        NotificationSettings::default()
            .with_channel(ChannelSettings::new("ops-email", ChannelConfig::email()))
            .with_channel(ChannelSettings::new("ops-sms", ChannelConfig::sms()))
            .with_recipient(
                Recipient::new("r-1", "Facilities")
                    .with_email("facilities@example.com")
                    .with_phone("+15550100"),
            )
    }

    #[tokio::test]
    async fn notify_sends_over_every_channel() {
        let service = service();
        let alert = alert(AlertSeverity::High, now());
        let mut out = Vec::new();

        NotifyCommand::new(&service)
            .execute(&mut out, &OutputFormat::new(Format::Json), &settings(), &alert, now())
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["sent"], 2);
        assert_eq!(report["failed"], 0);
        assert_eq!(report["escalation_level"], 0);
        assert_eq!(report["notifications"][0]["recipient"], "facilities@example.com");
        assert_eq!(report["notifications"][1]["recipient"], "+15550100");
    }

    #[tokio::test]
    async fn notify_reports_nothing_during_quiet_hours() {
        let service = service();
        let alert = alert(AlertSeverity::Low, now());
        let mut settings = settings();
        settings.quiet_hours = Some(QuietHours::new("00:00".parse().unwrap(), "23:59".parse().unwrap(), "UTC"));
        let mut out = Vec::new();

        NotifyCommand::new(&service)
            .execute(&mut out, &OutputFormat::new(Format::Table), &settings, &alert, now())
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert_eq!(output, format!("No notifications sent for alert {}\n", alert.id));
    }

    #[tokio::test]
    async fn notify_rejects_unknown_timezone() {
        let service = service();
        let alert = alert(AlertSeverity::Low, now());
        let mut settings = settings();
        settings.quiet_hours = Some(QuietHours::new(
            "22:00".parse().unwrap(),
            "06:00".parse().unwrap(),
            "Mars/Olympus",
        ));
        let mut out = Vec::new();

        let err = NotifyCommand::new(&service)
            .execute(&mut out, &OutputFormat::default(), &settings, &alert, now())
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Alert(_)));
        assert!(out.is_empty());
    }
}
