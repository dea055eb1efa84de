//! Decides which (channel, recipient) pairs an alert reaches.
//!
//! Routing is separate from sending: [`NotificationRouter::plan`] produces a
//! [`RoutingPlan`] of targets in the `routed` state plus the pairs it held
//! back and why. The delivery service then moves each routed target to
//! `delivered` or `failed`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::alert::AlertInstance;
use crate::channels::DeliveryTarget;
use crate::error::{AlertError, Result};
use crate::escalation::EscalationStage;
use crate::settings::{ChannelConfig, ChannelKind, ChannelSettings, NotificationSettings, Recipient};
use crate::store::{AlertStore, DeliveryRecord};
use crate::types::AlertSeverity;

/// Per-target delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Not yet routed.
    Pending,
    /// Passed every routing check.
    Routed,
    /// The provider accepted the message.
    Delivered,
    /// The send failed or timed out.
    Failed,
}

impl DeliveryState {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTransition` unless the move is
    /// `pending -> routed` or `routed -> delivered|failed`.
    pub fn transition(self, next: Self) -> Result<Self> {
        match (self, next) {
            (Self::Pending, Self::Routed) | (Self::Routed, Self::Delivered | Self::Failed) => Ok(next),
            _ => Err(AlertError::InvalidTransition {
                id: "delivery".to_string(),
                reason: format!("{self} -> {next}"),
            }),
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Routed => "routed",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Why a pair was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// The alert was raised during maintenance.
    AlertSuppressed,
    /// The channel is disabled or filters out the severity.
    ChannelFilter,
    /// Quiet hours are active.
    QuietHours,
    /// The recipient is off shift.
    OffShift,
    /// The recipient does not want this channel for this severity.
    ChannelPreference,
    /// The recipient has no address for this channel.
    NoContact,
    /// `max_alerts_per_hour` reached.
    HourlyLimit,
    /// `max_alerts_per_day` reached.
    DailyLimit,
    /// The recipient's own hourly cap is reached.
    RecipientLimit,
    /// A similar alert reached the recipient within the cooldown.
    SimilarCooldown,
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AlertSuppressed => "alert suppressed",
            Self::ChannelFilter => "channel filter",
            Self::QuietHours => "quiet hours",
            Self::OffShift => "off shift",
            Self::ChannelPreference => "channel preference",
            Self::NoContact => "no contact",
            Self::HourlyLimit => "hourly limit",
            Self::DailyLimit => "daily limit",
            Self::RecipientLimit => "recipient limit",
            Self::SimilarCooldown => "similar alert cooldown",
        };
        write!(f, "{s}")
    }
}

/// A target that passed routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDelivery {
    /// Where the message goes.
    pub target: DeliveryTarget,
    /// Key the delivery is counted against.
    pub recipient_key: String,
    /// Current state.
    pub state: DeliveryState,
}

/// A pair that was held back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDelivery {
    /// Channel id.
    pub channel_id: String,
    /// Recipient id, if the check was per recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Why.
    pub reason: SuppressionReason,
}

/// The routing decision for one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// Targets to send to, in channel order.
    pub deliveries: Vec<PlannedDelivery>,
    /// Pairs held back.
    pub skipped: Vec<SkippedDelivery>,
}

impl RoutingPlan {
    /// Returns true if nothing is to be sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    fn route(&mut self, target: DeliveryTarget, recipient_key: String) {
        self.deliveries.push(PlannedDelivery {
            target,
            recipient_key,
            state: DeliveryState::Routed,
        });
    }

    fn skip(&mut self, channel_id: &str, recipient_id: Option<&str>, reason: SuppressionReason) {
        debug!(channel_id, recipient_id, %reason, "notification held back");
        self.skipped.push(SkippedDelivery {
            channel_id: channel_id.to_string(),
            recipient_id: recipient_id.map(str::to_string),
            reason,
        });
    }
}

/// Key that webhook deliveries are counted under.
#[must_use]
pub fn webhook_key(channel_id: &str) -> String {
    format!("webhook:{channel_id}")
}

/// Applies channel filters, quiet hours, shifts, preferences and frequency limits.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    store: Arc<dyn AlertStore>,
}

impl NotificationRouter {
    /// Creates a router reading delivery history from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Plans the initial notification of `alert` at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidTimezone` for an unknown quiet-hours or
    /// shift timezone, or `AlertError::StoreError` if delivery history is
    /// unavailable.
    pub fn plan(
        &self,
        settings: &NotificationSettings,
        alert: &AlertInstance,
        now: DateTime<Utc>,
    ) -> Result<RoutingPlan> {
        let mut plan = RoutingPlan::default();

        if alert.suppressed {
            plan.skip("*", None, SuppressionReason::AlertSuppressed);
            return Ok(plan);
        }

        let channels: Vec<&ChannelSettings> = settings
            .channels
            .iter()
            .filter(|channel| {
                let accepted = channel.accepts(alert.severity);
                if !accepted {
                    plan.skip(&channel.id, None, SuppressionReason::ChannelFilter);
                }
                accepted
            })
            .collect();

        if let Some(quiet) = &settings.quiet_hours {
            if quiet.suppresses(alert.severity, now)? {
                for channel in &channels {
                    plan.skip(&channel.id, None, SuppressionReason::QuietHours);
                }
                debug!(alert_id = %alert.id, severity = %alert.severity, "quiet hours active");
                return Ok(plan);
            }
        }

        let mut limits = LimitTracker::new(self.store.as_ref(), settings, alert, now);
        for channel in channels {
            match &channel.config {
                ChannelConfig::Webhook { url, .. } => plan.route(
                    DeliveryTarget {
                        channel_id: channel.id.clone(),
                        address: url.clone(),
                        config: channel.config.clone(),
                    },
                    webhook_key(&channel.id),
                ),
                _ => {
                    for recipient in &settings.recipients {
                        Self::route_recipient(&mut plan, &mut limits, channel, recipient, alert.severity, now)?;
                    }
                }
            }
        }
        Ok(plan)
    }

    fn route_recipient(
        plan: &mut RoutingPlan,
        limits: &mut LimitTracker<'_>,
        channel: &ChannelSettings,
        recipient: &Recipient,
        severity: AlertSeverity,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let kind = channel.kind();
        let recipient_id = Some(recipient.id.as_str());

        if severity != AlertSeverity::Critical {
            if let Some(shift) = &recipient.on_call {
                if !shift.is_on_call(now)? {
                    plan.skip(&channel.id, recipient_id, SuppressionReason::OffShift);
                    return Ok(());
                }
            }
        }
        if !recipient.prefers(severity, kind) {
            plan.skip(&channel.id, recipient_id, SuppressionReason::ChannelPreference);
            return Ok(());
        }
        let Some(address) = recipient.address_for(kind) else {
            plan.skip(&channel.id, recipient_id, SuppressionReason::NoContact);
            return Ok(());
        };
        if let Some(reason) = limits.check(recipient)? {
            plan.skip(&channel.id, recipient_id, reason);
            return Ok(());
        }

        limits.count(&recipient.id);
        plan.route(
            DeliveryTarget {
                channel_id: channel.id.clone(),
                address: address.to_string(),
                config: channel.config.clone(),
            },
            recipient.id.clone(),
        );
        Ok(())
    }

    /// Plans an escalation stage. Stages name their own recipients and
    /// channel kinds; quiet hours, shifts and frequency limits do not apply.
    #[must_use]
    pub fn plan_stage(alert: &AlertInstance, stage: &EscalationStage) -> RoutingPlan {
        let mut plan = RoutingPlan::default();
        let mut seen = HashSet::new();

        for kind in &stage.channels {
            let channel_id = format!("escalation-{}-{kind}", stage.level);
            for recipient in &stage.recipients {
                let Some(address) = recipient.address_for(*kind) else {
                    plan.skip(&channel_id, Some(recipient.id.as_str()), SuppressionReason::NoContact);
                    continue;
                };
                if !seen.insert((*kind, address.to_string())) {
                    continue;
                }
                plan.route(
                    DeliveryTarget {
                        channel_id: channel_id.clone(),
                        address: address.to_string(),
                        config: default_config(*kind),
                    },
                    recipient.id.clone(),
                );
            }
        }
        debug!(
            alert_id = %alert.id,
            level = stage.level,
            targets = plan.deliveries.len(),
            "escalation stage planned"
        );
        plan
    }
}

fn default_config(kind: ChannelKind) -> ChannelConfig {
    match kind {
        ChannelKind::Email => ChannelConfig::email(),
        ChannelKind::Sms => ChannelConfig::sms(),
        ChannelKind::Webhook => ChannelConfig::webhook(String::new()),
    }
}

/// Frequency-limit bookkeeping for one routing pass.
struct LimitTracker<'a> {
    store: &'a dyn AlertStore,
    settings: &'a NotificationSettings,
    alert: &'a AlertInstance,
    now: DateTime<Utc>,
    history: HashMap<String, Vec<DeliveryRecord>>,
    planned: HashMap<String, u32>,
}

impl<'a> LimitTracker<'a> {
    fn new(
        store: &'a dyn AlertStore,
        settings: &'a NotificationSettings,
        alert: &'a AlertInstance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            settings,
            alert,
            now,
            history: HashMap::new(),
            planned: HashMap::new(),
        }
    }

    fn lookback(&self) -> Duration {
        let cooldown = Duration::minutes(i64::from(
            self.settings.frequency_limits.cooldown_between_similar_minutes,
        ));
        cooldown.max(Duration::days(1))
    }

    fn history(&mut self, recipient_id: &str) -> Result<&[DeliveryRecord]> {
        if !self.history.contains_key(recipient_id) {
            let since = self.now - self.lookback();
            let records = self.store.deliveries_since(recipient_id, since)?;
            self.history.insert(recipient_id.to_string(), records);
        }
        Ok(self.history.get(recipient_id).map(Vec::as_slice).unwrap_or_default())
    }

    /// Returns the limit `recipient` has hit, if any.
    fn check(&mut self, recipient: &Recipient) -> Result<Option<SuppressionReason>> {
        let limits = self.settings.frequency_limits.clone();
        let (now, alert_id) = (self.now, self.alert.id.clone());
        let (configuration_id, rule_id) = (self.alert.configuration_id.clone(), self.alert.rule_id.clone());
        let planned = self.planned.get(&recipient.id).copied().unwrap_or(0);
        let history = self.history(&recipient.id)?;

        let distinct_since = |since: DateTime<Utc>| {
            history
                .iter()
                .filter(|r| r.sent_at >= since && r.alert_id != alert_id)
                .map(|r| r.alert_id.as_str())
                .collect::<HashSet<_>>()
                .len()
        };

        let hour_ago = now - Duration::hours(1);
        if let Some(max) = limits.max_alerts_per_hour {
            if distinct_since(hour_ago) >= max as usize {
                return Ok(Some(SuppressionReason::HourlyLimit));
            }
        }
        if let Some(max) = limits.max_alerts_per_day {
            if distinct_since(now - Duration::days(1)) >= max as usize {
                return Ok(Some(SuppressionReason::DailyLimit));
            }
        }
        if let Some(max) = recipient.max_notifications_per_hour {
            let sent = history.iter().filter(|r| r.sent_at >= hour_ago).count();
            if sent + planned as usize >= max as usize {
                return Ok(Some(SuppressionReason::RecipientLimit));
            }
        }
        if limits.cooldown_between_similar_minutes > 0 {
            let since = now - Duration::minutes(i64::from(limits.cooldown_between_similar_minutes));
            let similar = history.iter().any(|r| {
                r.sent_at >= since
                    && r.alert_id != alert_id
                    && r.similarity_key() == (configuration_id.as_str(), rule_id.as_str())
            });
            if similar {
                return Ok(Some(SuppressionReason::SimilarCooldown));
            }
        }
        Ok(None)
    }

    fn count(&mut self, recipient_id: &str) {
        *self.planned.entry(recipient_id.to_string()).or_default() += 1;
    }
}
