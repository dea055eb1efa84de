//! Notification settings attached to a configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::quiet_hours::QuietHours;
use crate::schedule::OnCallSchedule;
use crate::types::AlertSeverity;

/// The delivery channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Email.
    Email,
    /// SMS text message.
    Sms,
    /// HTTP webhook.
    Webhook,
}

impl ChannelKind {
    /// Returns the channel kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-channel configuration, keyed by channel `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Email delivery.
    Email {
        /// Overrides the configured sender address.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_address: Option<String>,
        /// Prepended to every subject line.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_prefix: Option<String>,
    },
    /// SMS delivery.
    Sms {
        /// Sender id shown to the recipient.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        /// Maximum message length; longer messages are truncated.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    /// Webhook delivery.
    Webhook {
        /// Target URL.
        url: String,
        /// Extra HTTP headers.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// Overrides the configured webhook timeout.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl ChannelConfig {
    /// Returns the kind this configuration is for.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::Email { .. } => ChannelKind::Email,
            Self::Sms { .. } => ChannelKind::Sms,
            Self::Webhook { .. } => ChannelKind::Webhook,
        }
    }

    /// Email configuration with defaults.
    #[must_use]
    pub const fn email() -> Self {
        Self::Email {
            from_address: None,
            subject_prefix: None,
        }
    }

    /// SMS configuration with defaults.
    #[must_use]
    pub const fn sms() -> Self {
        Self::Sms {
            sender_id: None,
            max_length: None,
        }
    }

    /// Webhook configuration targeting `url`.
    #[must_use]
    pub fn webhook(url: impl Into<String>) -> Self {
        Self::Webhook {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }
}

/// One configured delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel identifier.
    pub id: String,
    /// Whether the channel is used.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Severities this channel carries. Empty means all.
    #[serde(default)]
    pub priority_filter: Vec<AlertSeverity>,
    /// Kind-specific configuration.
    pub config: ChannelConfig,
}

const fn default_true() -> bool {
    true
}

impl ChannelSettings {
    /// Creates an enabled channel accepting every severity.
    #[must_use]
    pub fn new(id: impl Into<String>, config: ChannelConfig) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            priority_filter: Vec::new(),
            config,
        }
    }

    /// Restricts the channel to the given severities.
    #[must_use]
    pub fn with_priority_filter(mut self, severities: Vec<AlertSeverity>) -> Self {
        self.priority_filter = severities;
        self
    }

    /// Sets whether the channel is enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the channel kind.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.config.kind()
    }

    /// Returns true if the channel is enabled and carries `severity`.
    #[must_use]
    pub fn accepts(&self, severity: AlertSeverity) -> bool {
        self.enabled && (self.priority_filter.is_empty() || self.priority_filter.contains(&severity))
    }
}

/// Ways to reach a recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMethods {
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number for SMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// A person or team that receives notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Recipient identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Contact methods.
    #[serde(default)]
    pub contact: ContactMethods,
    /// Only notified during this shift, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_call: Option<OnCallSchedule>,
    /// Allowed channel kinds per severity. Missing severities allow all kinds.
    #[serde(default)]
    pub channel_preferences: HashMap<AlertSeverity, Vec<ChannelKind>>,
    /// Personal hourly cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_notifications_per_hour: Option<u32>,
}

impl Recipient {
    /// Creates a recipient with no contact methods.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contact: ContactMethods::default(),
            on_call: None,
            channel_preferences: HashMap::new(),
            max_notifications_per_hour: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.contact.email = Some(email.into());
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.contact.phone = Some(phone.into());
        self
    }

    /// Sets the on-call shift.
    #[must_use]
    pub fn with_on_call(mut self, schedule: OnCallSchedule) -> Self {
        self.on_call = Some(schedule);
        self
    }

    /// Restricts the channels used for `severity`.
    #[must_use]
    pub fn with_preference(mut self, severity: AlertSeverity, kinds: Vec<ChannelKind>) -> Self {
        self.channel_preferences.insert(severity, kinds);
        self
    }

    /// Returns the address used for `kind`, if the recipient has one.
    #[must_use]
    pub fn address_for(&self, kind: ChannelKind) -> Option<&str> {
        match kind {
            ChannelKind::Email => self.contact.email.as_deref(),
            ChannelKind::Sms => self.contact.phone.as_deref(),
            ChannelKind::Webhook => None,
        }
    }

    /// Returns true if the recipient accepts `kind` for `severity`.
    #[must_use]
    pub fn prefers(&self, severity: AlertSeverity, kind: ChannelKind) -> bool {
        self.channel_preferences
            .get(&severity)
            .is_none_or(|kinds| kinds.contains(&kind))
    }
}

/// Caps on how often recipients are notified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyLimits {
    /// Distinct alerts per recipient per rolling hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alerts_per_hour: Option<u32>,
    /// Distinct alerts per recipient per rolling day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_alerts_per_day: Option<u32>,
    /// Minutes before a recipient hears about the same rule again.
    #[serde(default)]
    pub cooldown_between_similar_minutes: u32,
    /// Unacknowledged notifications after which escalation is suggested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_threshold: Option<u32>,
}

/// How alerts of a configuration are delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Channels, in dispatch order.
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,
    /// Recipients.
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    /// Rate caps.
    #[serde(default)]
    pub frequency_limits: FrequencyLimits,
    /// Quiet hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    /// Suggested minutes between escalation stages.
    #[serde(default)]
    pub escalation_delays: Vec<u32>,
}

impl NotificationSettings {
    /// Adds a channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelSettings) -> Self {
        self.channels.push(channel);
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Sets quiet hours.
    #[must_use]
    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.quiet_hours = Some(quiet_hours);
        self
    }

    /// Sets frequency limits.
    #[must_use]
    pub const fn with_frequency_limits(mut self, limits: FrequencyLimits) -> Self {
        self.frequency_limits = limits;
        self
    }

    /// Finds a channel by id.
    #[must_use]
    pub fn channel(&self, id: &str) -> Option<&ChannelSettings> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Checks that ids are unique and webhook URLs are present.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidConfiguration` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.id.as_str()) {
                return Err(AlertError::InvalidConfiguration {
                    reason: format!("duplicate channel id '{}'", channel.id),
                });
            }
            if let ChannelConfig::Webhook { url, .. } = &channel.config {
                if url.trim().is_empty() {
                    return Err(AlertError::InvalidConfiguration {
                        reason: format!("webhook channel '{}' has no url", channel.id),
                    });
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for recipient in &self.recipients {
            if !seen.insert(recipient.id.as_str()) {
                return Err(AlertError::InvalidConfiguration {
                    reason: format!("duplicate recipient id '{}'", recipient.id),
                });
            }
        }
        Ok(())
    }
}
