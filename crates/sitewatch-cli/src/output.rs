//! Output formatting for CLI commands.
//!
//! Supports JSON (the default) and human-readable table output.

use std::io::Write;

use serde::Serialize;
use sitewatch_alerts::{NotificationLog, ValidationReport};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Json)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Outcome of a notification or escalation run.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    /// The alert notified about.
    pub alert_id: String,
    /// Escalation level of the run (0 for the initial send).
    pub escalation_level: u32,
    /// Entries that went out.
    pub sent: usize,
    /// Entries that failed.
    pub failed: usize,
    /// New log entries, in dispatch order.
    pub notifications: Vec<NotificationLog>,
}

impl DeliveryReport {
    /// Summarizes `notifications` for `alert_id`.
    #[must_use]
    pub fn new(alert_id: impl Into<String>, escalation_level: u32, notifications: Vec<NotificationLog>) -> Self {
        let sent = notifications.iter().filter(|n| n.is_sent()).count();
        Self {
            alert_id: alert_id.into(),
            escalation_level,
            sent,
            failed: notifications.len() - sent,
            notifications,
        }
    }
}

impl TableDisplay for DeliveryReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.notifications.is_empty() {
            writeln!(writer, "No notifications sent for alert {}", self.alert_id)?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<8}  {:<24}  {:<32}  {:<7}  DETAIL",
            "CHANNEL", "CHANNEL ID", "RECIPIENT", "STATUS"
        )?;
        writeln!(writer, "{}", "─".repeat(100))?;

        for entry in &self.notifications {
            let detail = entry
                .failure_reason
                .as_deref()
                .or(entry.provider_message_id.as_deref())
                .unwrap_or("-");
            writeln!(
                writer,
                "{:<8}  {:<24}  {:<32}  {:<7}  {}",
                entry.channel.as_str(),
                truncate(&entry.channel_id, 24),
                truncate(&entry.recipient, 32),
                entry.status.to_string(),
                detail
            )?;
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Alert {} (level {}): {} sent, {} failed",
            self.alert_id, self.escalation_level, self.sent, self.failed
        )?;
        Ok(())
    }
}

impl TableDisplay for ValidationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let verdict = if self.is_valid { "valid" } else { "invalid" };
        writeln!(writer, "Configuration is {verdict}")?;
        writeln!(writer, "══════════════════════════════════")?;

        for (label, issues) in [("Errors", &self.errors), ("Warnings", &self.warnings)] {
            if issues.is_empty() {
                continue;
            }
            writeln!(writer, "{label}")?;
            for issue in issues {
                writeln!(
                    writer,
                    "  {:<32}  {:<28}  {}",
                    truncate(&issue.field, 32),
                    issue.error_code,
                    issue.message
                )?;
            }
            writeln!(writer)?;
        }

        let compatibility = &self.subscription_compatibility;
        writeln!(writer, "Subscription")?;
        writeln!(writer, "  Current tier:   {}", compatibility.current_tier)?;
        match compatibility.required_tier {
            Some(tier) => writeln!(writer, "  Required tier:  {tier}")?,
            None => writeln!(writer, "  Required tier:  none covers this configuration")?,
        }
        for limitation in &compatibility.limitations {
            writeln!(writer, "  - {limitation}")?;
        }
        writeln!(writer)?;
        writeln!(writer, "Estimates")?;
        writeln!(
            writer,
            "  Alerts:         {:.1}/day, {:.1}/month",
            self.estimated_alert_volume.daily, self.estimated_alert_volume.monthly
        )?;
        writeln!(writer, "  Monthly cost:   {:.2}", self.estimated_cost_impact)?;
        Ok(())
    }
}

/// Shortens `s` to at most `max_len` characters, marking the cut with `...`.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
