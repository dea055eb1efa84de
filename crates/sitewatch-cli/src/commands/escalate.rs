//! Escalation stage command implementation.

use std::io::Write;

use chrono::{DateTime, Utc};
use sitewatch_alerts::{AlertInstance, EscalationPolicy, NotificationDeliveryService};

use crate::error::CliError;
use crate::output::{DeliveryReport, OutputFormat};

/// Handler for `escalate`.
pub struct EscalateCommand<'a> {
    service: &'a NotificationDeliveryService,
}

impl<'a> EscalateCommand<'a> {
    /// Creates a new escalate command handler.
    #[must_use]
    pub const fn new(service: &'a NotificationDeliveryService) -> Self {
        Self { service }
    }

    /// Runs stage `stage_index` of `policy` for `alert`.
    ///
    /// A halted escalation writes an empty report.
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be written.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        alert: &AlertInstance,
        policy: &EscalationPolicy,
        stage_index: usize,
        now: DateTime<Utc>,
    ) -> Result<(), CliError> {
        let notifications = self
            .service
            .handle_escalation_at(alert, policy, stage_index, now)
            .await;
        let level = u32::try_from(stage_index + 1).unwrap_or(u32::MAX);

        format.write(out, &DeliveryReport::new(&alert.id, level, notifications))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use sitewatch_alerts::{
        AlertSeverity, AlertStatus, ChannelKind, DeliveryConfig, EscalationStage,
        InMemoryAlertStore, LogProvider, Recipient,
    };

    use crate::cli::Format;
    use crate::commands::test_support::alert;

    fn triggered() -> DateTime<Utc> {
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

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(
            vec![
                EscalationStage::new(
                    1,
                    15,
                    vec![Recipient::new("lead", "Shift lead").with_phone("+15550101")],
                    vec![ChannelKind::Sms],
                )
                .with_message("Energy alert still unacknowledged"),
                EscalationStage::new(
                    2,
                    30,
                    vec![Recipient::new("manager", "Facilities manager").with_email("fm@example.com")],
                    vec![ChannelKind::Email],
                ),
            ],
            2,
        )
    }

    #[tokio::test]
    async fn escalate_first_stage() {
        let service = service();
        let alert = alert(AlertSeverity::High, triggered());
        let mut out = Vec::new();

        EscalateCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Json),
                &alert,
                &policy(),
                0,
                triggered() + Duration::minutes(15),
            )
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["escalation_level"], 1);
        assert_eq!(report["sent"], 1);
        assert_eq!(report["notifications"][0]["channel"], "sms");
        assert_eq!(report["notifications"][0]["recipient"], "+15550101");
        assert_eq!(report["notifications"][0]["escalation_level"], 1);
    }

    #[tokio::test]
    async fn escalate_acknowledged_alert_writes_empty_report() {
        let service = service();
        let mut alert = alert(AlertSeverity::High, triggered());
        alert.status = AlertStatus::Acknowledged;
        let mut out = Vec::new();

        EscalateCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Json),
                &alert,
                &policy(),
                0,
                triggered() + Duration::minutes(20),
            )
            .await
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["sent"], 0);
        assert!(report["notifications"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn escalate_stage_out_of_order_is_halted() {
        let service = service();
        let alert = alert(AlertSeverity::High, triggered());
        let mut out = Vec::new();

        EscalateCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Table),
                &alert,
                &policy(),
                5,
                triggered() + Duration::hours(2),
            )
            .await
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("No notifications sent"));
    }
}
