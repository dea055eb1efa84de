//! Escalation planning command implementation.
//!
//! Reports what an external scheduler should do next for an alert, and when
//! each stage of the policy falls due.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sitewatch_alerts::{
    AlertInstance, ChannelKind, EscalationAction, EscalationPolicy, EscalationScheduler,
};

use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay};

/// Handler for `plan-escalation`.
#[derive(Debug, Default)]
pub struct PlanEscalationCommand;

impl PlanEscalationCommand {
    /// Creates a new plan-escalation command handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Writes the next action and stage schedule for `alert` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns error if the plan cannot be written.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        alert: &AlertInstance,
        policy: &EscalationPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), CliError> {
        let plan = EscalationPlan::build(alert, policy, now);
        format.write(out, &plan)?;
        Ok(())
    }
}

/// One stage of the schedule.
#[derive(Debug, Clone, Serialize)]
pub struct StageSchedule {
    /// Zero-based stage index.
    pub stage_index: usize,
    /// Escalation level the stage represents.
    pub level: u32,
    /// When the stage falls due if nobody acknowledges.
    pub due_at: DateTime<Utc>,
    /// Channel kinds used.
    pub channels: Vec<ChannelKind>,
    /// Number of recipients.
    pub recipients: usize,
    /// Whether the stage already ran.
    pub completed: bool,
}

/// The next escalation action and the full stage schedule.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationPlan {
    /// The alert planned for.
    pub alert_id: String,
    /// The planning instant.
    pub evaluated_at: DateTime<Utc>,
    /// What to do next.
    pub next: EscalationAction,
    /// When auto-resolve falls due, if enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_resolve_at: Option<DateTime<Utc>>,
    /// Stages that may run, in order.
    pub stages: Vec<StageSchedule>,
}

impl EscalationPlan {
    /// Plans escalation for `alert` as of `now`.
    #[must_use]
    pub fn build(alert: &AlertInstance, policy: &EscalationPolicy, now: DateTime<Utc>) -> Self {
        let runnable = policy.stages.len().min(policy.max_escalations as usize);
        let stages = policy.stages[..runnable]
            .iter()
            .enumerate()
            .filter_map(|(stage_index, stage)| {
                let due_at = policy.stage_due_at(alert.triggered_at, stage_index)?;
                Some(StageSchedule {
                    stage_index,
                    level: stage.level,
                    due_at,
                    channels: stage.channels.clone(),
                    recipients: stage.recipients.len(),
                    completed: stage_index < alert.escalation_level as usize,
                })
            })
            .collect();

        Self {
            alert_id: alert.id.clone(),
            evaluated_at: now,
            next: EscalationScheduler::next_action(alert, policy, now),
            auto_resolve_at: policy.auto_resolve_at(alert.triggered_at),
            stages,
        }
    }
}

impl TableDisplay for EscalationPlan {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Escalation plan for alert {}", self.alert_id)?;
        writeln!(writer, "══════════════════════════════════")?;
        match &self.next {
            EscalationAction::Escalate { stage_index, due_at } => {
                let state = if *due_at <= self.evaluated_at { "due now" } else { "pending" };
                writeln!(
                    writer,
                    "Next:  run stage {stage_index} at {} ({state})",
                    due_at.to_rfc3339()
                )?;
            }
            EscalationAction::AutoResolve => writeln!(writer, "Next:  auto-resolve")?,
            EscalationAction::Halt { reason } => writeln!(writer, "Next:  halt ({reason})")?,
        }
        if let Some(at) = self.auto_resolve_at {
            writeln!(writer, "Auto-resolve at:  {}", at.to_rfc3339())?;
        }
        writeln!(writer)?;

        if self.stages.is_empty() {
            writeln!(writer, "Policy has no runnable stages")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:>5}  {:>5}  {:<25}  {:<16}  {:>10}  DONE",
            "STAGE", "LEVEL", "DUE", "CHANNELS", "RECIPIENTS"
        )?;
        writeln!(writer, "{}", "─".repeat(80))?;
        for stage in &self.stages {
            let channels = stage
                .channels
                .iter()
                .map(ChannelKind::as_str)
                .collect::<Vec<_>>()
                .join(",");
            writeln!(
                writer,
                "{:>5}  {:>5}  {:<25}  {:<16}  {:>10}  {}",
                stage.stage_index,
                stage.level,
                stage.due_at.to_rfc3339(),
                channels,
                stage.recipients,
                if stage.completed { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}
