//! Escalation policies and the stage state machine.
//!
//! Escalation is driven from outside: a cron job or durable timer asks
//! [`EscalationScheduler::next_action`] what is due and then invokes the
//! delivery service for that stage. Nothing here sleeps or keeps timers, so a
//! restart loses no state beyond what the alert already records.
//!
//! ```text
//! stage 0 -> stage 1 -> ... -> max_escalations
//!    |          |
//!    +----------+--> acknowledged | resolved | exhausted
//! ```
//!
//! Stage `n` becomes due at `triggered_at + delay(0)` for the first stage,
//! and for later stages once the previous stage's acknowledgment timeout and
//! this stage's delay have both elapsed after the previous stage fell due.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alert::{AlertInstance, AlertStatus};
use crate::settings::{ChannelKind, Recipient};

/// One step of re-notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStage {
    /// Escalation level this stage represents.
    pub level: u32,
    /// Minutes to wait before this stage fires.
    #[serde(default)]
    pub delay_minutes: u32,
    /// Who is notified.
    pub recipients: Vec<Recipient>,
    /// Channel kinds used.
    pub channels: Vec<ChannelKind>,
    /// Whether an unacknowledged alert moves on to the next stage.
    #[serde(default = "default_true")]
    pub require_acknowledgment: bool,
    /// Minutes to wait for acknowledgment before the next stage.
    #[serde(default = "default_ack_timeout")]
    pub acknowledgment_timeout_minutes: u32,
    /// Message sent instead of the alert description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_ack_timeout() -> u32 {
    15
}

impl EscalationStage {
    /// Creates a stage requiring acknowledgment within the default timeout.
    #[must_use]
    pub fn new(level: u32, delay_minutes: u32, recipients: Vec<Recipient>, channels: Vec<ChannelKind>) -> Self {
        Self {
            level,
            delay_minutes,
            recipients,
            channels,
            require_acknowledgment: true,
            acknowledgment_timeout_minutes: default_ack_timeout(),
            custom_message: None,
        }
    }

    /// Sets the custom message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }

    /// Sets the acknowledgment requirement and timeout.
    #[must_use]
    pub const fn with_acknowledgment(mut self, required: bool, timeout_minutes: u32) -> Self {
        self.require_acknowledgment = required;
        self.acknowledgment_timeout_minutes = timeout_minutes;
        self
    }
}

/// Staged re-notification for unacknowledged alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Stages, in order.
    pub stages: Vec<EscalationStage>,
    /// Maximum number of stages that may run.
    pub max_escalations: u32,
    /// Resolve alerts left unacknowledged too long.
    #[serde(default)]
    pub auto_resolve: bool,
    /// Minutes after triggering before auto-resolve.
    #[serde(default)]
    pub auto_resolve_timeout_minutes: u32,
}

impl EscalationPolicy {
    /// Creates a policy without auto-resolve.
    #[must_use]
    pub const fn new(stages: Vec<EscalationStage>, max_escalations: u32) -> Self {
        Self {
            stages,
            max_escalations,
            auto_resolve: false,
            auto_resolve_timeout_minutes: 0,
        }
    }

    /// Enables auto-resolve after `timeout_minutes`.
    #[must_use]
    pub const fn with_auto_resolve(mut self, timeout_minutes: u32) -> Self {
        self.auto_resolve = true;
        self.auto_resolve_timeout_minutes = timeout_minutes;
        self
    }

    /// Returns when auto-resolve falls due for an alert triggered at `triggered_at`.
    #[must_use]
    pub fn auto_resolve_at(&self, triggered_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.auto_resolve
            .then(|| triggered_at + minutes(self.auto_resolve_timeout_minutes))
    }

    /// Returns when stage `stage_index` falls due for an alert triggered at `triggered_at`.
    #[must_use]
    pub fn stage_due_at(&self, triggered_at: DateTime<Utc>, stage_index: usize) -> Option<DateTime<Utc>> {
        let first = self.stages.first()?;
        if stage_index >= self.stages.len() {
            return None;
        }
        let mut due = triggered_at + minutes(first.delay_minutes);
        for pair in self.stages[..=stage_index].windows(2) {
            due += minutes(pair[0].acknowledgment_timeout_minutes) + minutes(pair[1].delay_minutes);
        }
        Some(due)
    }
}

fn minutes(m: u32) -> Duration {
    Duration::minutes(i64::from(m))
}

/// Why escalation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Someone acknowledged the alert.
    Acknowledged,
    /// The alert was resolved or marked false positive.
    Resolved,
    /// `max_escalations` reached or no stages left.
    Exhausted,
    /// The previous stage does not require acknowledgment.
    AcknowledgmentNotRequired,
    /// The requested stage already ran.
    AlreadyEscalated,
    /// The auto-resolve timeout elapsed.
    AutoResolveElapsed,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::Exhausted => "exhausted",
            Self::AcknowledgmentNotRequired => "acknowledgment not required",
            Self::AlreadyEscalated => "already escalated",
            Self::AutoResolveElapsed => "auto-resolve elapsed",
        };
        write!(f, "{s}")
    }
}

/// What an external scheduler should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EscalationAction {
    /// Run `stage_index` at or after `due_at`.
    Escalate {
        /// Stage to run.
        stage_index: usize,
        /// When it falls due.
        due_at: DateTime<Utc>,
    },
    /// Resolve the alert; the auto-resolve timeout elapsed.
    AutoResolve,
    /// Stop escalating.
    Halt {
        /// Why.
        reason: HaltReason,
    },
}

/// Decides whether and when stages run.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationScheduler;

impl EscalationScheduler {
    /// Returns the next action for `alert` at `now`.
    #[must_use]
    pub fn next_action(alert: &AlertInstance, policy: &EscalationPolicy, now: DateTime<Utc>) -> EscalationAction {
        if let Some(reason) = Self::status_halt(alert) {
            return EscalationAction::Halt { reason };
        }
        if policy.auto_resolve_at(alert.triggered_at).is_some_and(|at| now >= at) {
            return EscalationAction::AutoResolve;
        }

        let stage_index = alert.escalation_level as usize;
        match Self::check_stage(alert, policy, stage_index, now) {
            Ok(_) => match policy.stage_due_at(alert.triggered_at, stage_index) {
                Some(due_at) => EscalationAction::Escalate { stage_index, due_at },
                None => EscalationAction::Halt {
                    reason: HaltReason::Exhausted,
                },
            },
            Err(reason) => EscalationAction::Halt { reason },
        }
    }

    /// Returns the stage to run, or why escalation halts.
    ///
    /// # Errors
    ///
    /// Returns the [`HaltReason`] when `stage_index` must not run.
    pub fn check_stage<'p>(
        alert: &AlertInstance,
        policy: &'p EscalationPolicy,
        stage_index: usize,
        now: DateTime<Utc>,
    ) -> std::result::Result<&'p EscalationStage, HaltReason> {
        if let Some(reason) = Self::status_halt(alert) {
            return Err(reason);
        }
        if policy.auto_resolve_at(alert.triggered_at).is_some_and(|at| now >= at) {
            return Err(HaltReason::AutoResolveElapsed);
        }
        let max = policy.max_escalations as usize;
        if alert.escalation_level as usize >= max || stage_index >= max {
            return Err(HaltReason::Exhausted);
        }
        let Some(stage) = policy.stages.get(stage_index) else {
            return Err(HaltReason::Exhausted);
        };
        if stage_index < alert.escalation_level as usize {
            return Err(HaltReason::AlreadyEscalated);
        }
        if stage_index > 0 && !policy.stages[stage_index - 1].require_acknowledgment {
            return Err(HaltReason::AcknowledgmentNotRequired);
        }

        debug!(alert_id = %alert.id, stage_index, level = stage.level, "escalation stage allowed");
        Ok(stage)
    }

    fn status_halt(alert: &AlertInstance) -> Option<HaltReason> {
        match alert.status {
            AlertStatus::Triggered => None,
            AlertStatus::Acknowledged => Some(HaltReason::Acknowledged),
            AlertStatus::Resolved | AlertStatus::FalsePositive => Some(HaltReason::Resolved),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::fixtures::alert;
    use crate::types::AlertSeverity;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 0, 0).unwrap()
    }

    fn stage(level: u32, delay: u32) -> EscalationStage {
        EscalationStage::new(
            level,
            delay,
            vec![Recipient::new("oncall", "On call").with_phone("+15550100")],
            vec![ChannelKind::Sms],
        )
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(vec![stage(1, 5), stage(2, 10), stage(3, 10)], 2)
    }

    mod due_tests {
        use super::*;

        #[test]
        fn stage_delays_accumulate() {
            let p = policy();
            assert_eq!(p.stage_due_at(t0(), 0), Some(t0() + Duration::minutes(5)));
            // 5 + 15 (ack timeout) + 10
            assert_eq!(p.stage_due_at(t0(), 1), Some(t0() + Duration::minutes(30)));
            assert_eq!(p.stage_due_at(t0(), 2), Some(t0() + Duration::minutes(55)));
            assert_eq!(p.stage_due_at(t0(), 3), None);
        }

        #[test]
        fn auto_resolve_time() {
            let p = policy().with_auto_resolve(120);
            assert_eq!(p.auto_resolve_at(t0()), Some(t0() + Duration::hours(2)));
            assert_eq!(policy().auto_resolve_at(t0()), None);
        }
    }

    mod next_action_tests {
        use super::*;

        #[test]
        fn first_stage_due() {
            let a = alert(AlertSeverity::High, t0());
            assert_eq!(
                EscalationScheduler::next_action(&a, &policy(), t0()),
                EscalationAction::Escalate {
                    stage_index: 0,
                    due_at: t0() + Duration::minutes(5)
                }
            );
        }

        #[test]
        fn follows_escalation_level() {
            let mut a = alert(AlertSeverity::High, t0());
            a.escalation_level = 1;
            assert!(matches!(
                EscalationScheduler::next_action(&a, &policy(), t0()),
                EscalationAction::Escalate { stage_index: 1, .. }
            ));
        }

        #[test]
        fn exhausted_at_max() {
            let mut a = alert(AlertSeverity::High, t0());
            a.escalation_level = 2;
            assert_eq!(
                EscalationScheduler::next_action(&a, &policy(), t0()),
                EscalationAction::Halt {
                    reason: HaltReason::Exhausted
                }
            );
        }

        #[test]
        fn acknowledged_halts() {
            let mut a = alert(AlertSeverity::High, t0());
            a.acknowledge("ops", t0()).unwrap();
            assert_eq!(
                EscalationScheduler::next_action(&a, &policy(), t0()),
                EscalationAction::Halt {
                    reason: HaltReason::Acknowledged
                }
            );
        }

        #[test]
        fn auto_resolve_due() {
            let a = alert(AlertSeverity::High, t0());
            let p = policy().with_auto_resolve(60);
            assert_eq!(
                EscalationScheduler::next_action(&a, &p, t0() + Duration::minutes(61)),
                EscalationAction::AutoResolve
            );
        }
    }

    mod check_stage_tests {
        use super::*;

        #[test]
        fn allows_first_two_stages() {
            let a = alert(AlertSeverity::High, t0());
            let p = policy();
            assert_eq!(EscalationScheduler::check_stage(&a, &p, 0, t0()).unwrap().level, 1);
            assert_eq!(EscalationScheduler::check_stage(&a, &p, 1, t0()).unwrap().level, 2);
            assert_eq!(
                EscalationScheduler::check_stage(&a, &p, 2, t0()).unwrap_err(),
                HaltReason::Exhausted
            );
        }

        #[test]
        fn prior_stage_without_ack_requirement_halts() {
            let a = alert(AlertSeverity::High, t0());
            let p = EscalationPolicy::new(vec![stage(1, 0).with_acknowledgment(false, 0), stage(2, 0)], 2);
            assert_eq!(
                EscalationScheduler::check_stage(&a, &p, 1, t0()).unwrap_err(),
                HaltReason::AcknowledgmentNotRequired
            );
        }

        #[test]
        fn stage_already_run_halts() {
            let mut a = alert(AlertSeverity::High, t0());
            a.escalation_level = 1;
            assert_eq!(
                EscalationScheduler::check_stage(&a, &policy(), 0, t0()).unwrap_err(),
                HaltReason::AlreadyEscalated
            );
        }

        #[test]
        fn resolved_halts() {
            let mut a = alert(AlertSeverity::High, t0());
            a.resolve(t0(), None).unwrap();
            assert_eq!(
                EscalationScheduler::check_stage(&a, &policy(), 0, t0()).unwrap_err(),
                HaltReason::Resolved
            );
        }

        #[test]
        fn out_of_range_halts() {
            let a = alert(AlertSeverity::High, t0());
            let p = EscalationPolicy::new(vec![stage(1, 0)], 5);
            assert_eq!(
                EscalationScheduler::check_stage(&a, &p, 3, t0()).unwrap_err(),
                HaltReason::Exhausted
            );
        }
    }
}
