//! Alert evaluation command implementation.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitewatch_alerts::{AlertConfiguration, AlertInstance, AlertRuleEngine, EvaluationContext};

use crate::error::CliError;
use crate::output::{truncate, OutputFormat, TableDisplay};

/// Handler for `evaluate`.
pub struct EvaluateCommand<'a> {
    engine: &'a AlertRuleEngine,
}

impl<'a> EvaluateCommand<'a> {
    /// Creates a new evaluate command handler.
    #[must_use]
    pub const fn new(engine: &'a AlertRuleEngine) -> Self {
        Self { engine }
    }

    /// Evaluates `configurations` against `context` and writes the raised alerts.
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be written.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        configurations: &[AlertConfiguration],
        context: &EvaluationContext,
    ) -> Result<(), CliError> {
        let alerts = self.engine.evaluate_alerts(configurations, context);
        let report = EvaluationReport {
            evaluated_at: context.current_time,
            configurations: configurations.len(),
            alerts,
        };

        format.write(out, &report)?;
        Ok(())
    }
}

/// Alerts raised by one evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// The evaluation instant.
    pub evaluated_at: DateTime<Utc>,
    /// Number of configurations considered.
    pub configurations: usize,
    /// Raised or reused alerts, at most one per configuration.
    pub alerts: Vec<AlertInstance>,
}

impl TableDisplay for EvaluationReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.alerts.is_empty() {
            writeln!(
                writer,
                "No alerts raised ({} configuration(s) evaluated at {})",
                self.configurations,
                self.evaluated_at.to_rfc3339()
            )?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<36}  {:<8}  {:>10}  {:<24}  DESCRIPTION",
            "ID", "SEVERITY", "CONFIDENCE", "TITLE"
        )?;
        writeln!(writer, "{}", "─".repeat(110))?;

        for alert in &self.alerts {
            writeln!(
                writer,
                "{:<36}  {:<8}  {:>10.2}  {:<24}  {}",
                alert.id,
                alert.severity.as_str(),
                alert.confidence,
                truncate(&alert.title, 24),
                alert.description
            )?;
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Total: {} alert(s) from {} configuration(s)",
            self.alerts.len(),
            self.configurations
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use sitewatch_alerts::{
        AlertRule, AlertSeverity, ComparisonOperator, Condition, EngineConfig, InMemoryAlertStore,
    };
    use sitewatch_metrics::{AggregationFunction, MetricSelector, SensorReading, TimeAggregation};

    use crate::cli::Format;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap()
    }

    fn server_room() -> AlertConfiguration {
        let rule = AlertRule::builder("Server room too hot")
            .priority(AlertSeverity::High)
            .condition(Condition::new(
                MetricSelector::new("temperature").unwrap().with_sensor("t-1"),
                ComparisonOperator::GreaterThan,
                27.0,
                TimeAggregation::new(AggregationFunction::Average, 15, 1).unwrap(),
            ))
            .build()
            .unwrap();
        AlertConfiguration::new("Server room", "user-1", "org-1", vec![rule])
    }

    fn context(value: f64) -> EvaluationContext {
        EvaluationContext::new(
            now(),
            vec![SensorReading::new("t-1", now() - Duration::minutes(2), value, "C")],
        )
    }

    fn engine() -> AlertRuleEngine {
        AlertRuleEngine::new(Arc::new(InMemoryAlertStore::new()), EngineConfig::default())
    }

    #[test]
    fn evaluate_writes_raised_alert() {
        let engine = engine();
        let cmd = EvaluateCommand::new(&engine);
        let mut out = Vec::new();

        cmd.execute(&mut out, &OutputFormat::new(Format::Json), &[server_room()], &context(31.5))
            .unwrap();

        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["configurations"], 1);
        assert_eq!(report["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(report["alerts"][0]["severity"], "high");
        assert_eq!(report["alerts"][0]["title"], "Server room");
    }

    #[test]
    fn evaluate_below_threshold_table_output() {
        let engine = engine();
        let cmd = EvaluateCommand::new(&engine);
        let mut out = Vec::new();

        cmd.execute(&mut out, &OutputFormat::new(Format::Table), &[server_room()], &context(22.0))
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("No alerts raised (1 configuration(s)"));
    }

    #[test]
    fn evaluate_table_lists_alerts() {
        let engine = engine();
        let cmd = EvaluateCommand::new(&engine);
        let mut out = Vec::new();

        cmd.execute(&mut out, &OutputFormat::new(Format::Table), &[server_room()], &context(31.5))
            .unwrap();

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("SEVERITY"));
        assert!(output.contains("high"));
        assert!(output.contains("Total: 1 alert(s) from 1 configuration(s)"));
    }
}
