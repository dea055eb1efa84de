//! Channel delivery adapters and the providers behind them.
//!
//! An adapter turns an alert into channel-specific content (email subject and
//! body, SMS text, webhook JSON) and hands the result to a
//! [`DeliveryProvider`]. Providers know the wire protocol; adapters do not.
//! Each send is independently fallible.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::alert::{AlertInstance, AlertStatus, MetricValueResult};
use crate::error::{AlertError, Result};
use crate::settings::{ChannelConfig, ChannelKind};
use crate::types::AlertSeverity;

/// Boxed future returned by adapters and providers.
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<DeliveryReceipt>> + Send + 'a>>;

/// Provider acknowledgment of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider-assigned message id.
    pub message_id: String,
}

impl DeliveryReceipt {
    /// Creates a receipt with a generated id.
    #[must_use]
    pub fn generated(prefix: &str) -> Self {
        Self {
            message_id: format!("{prefix}-{}", Uuid::new_v4()),
        }
    }
}

/// Channel-neutral content of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Alert id.
    pub alert_id: String,
    /// Configuration id.
    pub configuration_id: String,
    /// Rule id.
    pub rule_id: String,
    /// Alert title.
    pub title: String,
    /// Message body: the stage's custom message or the alert description.
    pub message: String,
    /// Severity.
    pub severity: AlertSeverity,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// When the alert fired.
    pub triggered_at: DateTime<Utc>,
    /// Escalation level of this send.
    pub escalation_level: u32,
    /// Per-condition results.
    pub metric_values: Vec<MetricValueResult>,
}

impl NotificationPayload {
    /// Builds the payload for `alert`, optionally replacing its description.
    #[must_use]
    pub fn from_alert(alert: &AlertInstance, custom_message: Option<&str>, escalation_level: u32) -> Self {
        Self {
            alert_id: alert.id.clone(),
            configuration_id: alert.configuration_id.clone(),
            rule_id: alert.rule_id.clone(),
            title: alert.title.clone(),
            message: custom_message.map_or_else(|| alert.description.clone(), str::to_string),
            severity: alert.severity,
            status: alert.status,
            confidence: alert.confidence,
            triggered_at: alert.triggered_at,
            escalation_level,
            metric_values: alert.metric_values.clone(),
        }
    }

    fn metric_lines(&self) -> Vec<String> {
        self.metric_values
            .iter()
            .map(|m| match m.value {
                Some(value) => format!(
                    "- {}: {value:.2} {} {} ({})",
                    m.metric_type,
                    m.operator,
                    m.threshold,
                    if m.met { "met" } else { "not met" }
                ),
                None => format!("- {}: not enough data", m.metric_type),
            })
            .collect()
    }
}

/// Where one send goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// Configured channel id.
    pub channel_id: String,
    /// Address: email, phone number or URL.
    pub address: String,
    /// Channel configuration.
    pub config: ChannelConfig,
}

impl DeliveryTarget {
    /// Returns the channel kind.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.config.kind()
    }
}

/// A rendered message ready for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Channel kind.
    pub channel: ChannelKind,
    /// Address.
    pub to: String,
    /// Sender, where the channel has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Subject line, for email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Body: plain text, or JSON for webhooks.
    pub body: String,
    /// Extra headers, for webhooks.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Sends rendered messages over a wire protocol.
pub trait DeliveryProvider: Send + Sync + fmt::Debug {
    /// Returns the provider name.
    fn name(&self) -> &str;

    /// Delivers one message.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::NotificationFailed` if the provider rejects the message.
    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> DeliveryFuture<'a>;
}

/// Renders and sends notifications for one channel kind.
pub trait ChannelDeliveryAdapter: Send + Sync + fmt::Debug {
    /// Returns the channel kind handled.
    fn kind(&self) -> ChannelKind;

    /// Sends `payload` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or delivery fails.
    fn send<'a>(&'a self, target: &'a DeliveryTarget, payload: &'a NotificationPayload) -> DeliveryFuture<'a>;
}

/// Email adapter.
#[derive(Debug, Clone)]
pub struct EmailAdapter {
    provider: Arc<dyn DeliveryProvider>,
    default_from: String,
}

impl EmailAdapter {
    /// Creates an email adapter.
    #[must_use]
    pub fn new(provider: Arc<dyn DeliveryProvider>, default_from: impl Into<String>) -> Self {
        Self {
            provider,
            default_from: default_from.into(),
        }
    }

    /// Renders the email for `target`.
    #[must_use]
    pub fn render(&self, target: &DeliveryTarget, payload: &NotificationPayload) -> OutboundMessage {
        let (from, prefix) = match &target.config {
            ChannelConfig::Email {
                from_address,
                subject_prefix,
            } => (from_address.clone(), subject_prefix.clone()),
            _ => (None, None),
        };

        let mut subject = format!(
            "[{}] {}",
            payload.severity.as_str().to_uppercase(),
            payload.title
        );
        if let Some(prefix) = prefix {
            subject = format!("{prefix} {subject}");
        }
        if payload.escalation_level > 0 {
            subject.push_str(&format!(" (escalation {})", payload.escalation_level));
        }

        let mut body = vec![
            payload.message.clone(),
            String::new(),
            format!("Severity: {}", payload.severity),
            format!("Triggered: {}", payload.triggered_at.to_rfc3339()),
            format!("Confidence: {:.0}%", payload.confidence * 100.0),
        ];
        let metrics = payload.metric_lines();
        if !metrics.is_empty() {
            body.push(String::new());
            body.push("Conditions:".to_string());
            body.extend(metrics);
        }
        body.push(String::new());
        body.push(format!("Alert id: {}", payload.alert_id));

        OutboundMessage {
            channel: ChannelKind::Email,
            to: target.address.clone(),
            from: Some(from.unwrap_or_else(|| self.default_from.clone())),
            subject: Some(subject),
            body: body.join("\n"),
            headers: BTreeMap::new(),
        }
    }
}

impl ChannelDeliveryAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn send<'a>(&'a self, target: &'a DeliveryTarget, payload: &'a NotificationPayload) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let message = self.render(target, payload);
            self.provider.deliver(&message).await
        })
    }
}

/// SMS adapter. Messages longer than the channel limit are truncated.
#[derive(Debug, Clone)]
pub struct SmsAdapter {
    provider: Arc<dyn DeliveryProvider>,
    default_max_length: usize,
}

impl SmsAdapter {
    /// Creates an SMS adapter.
    #[must_use]
    pub fn new(provider: Arc<dyn DeliveryProvider>, default_max_length: usize) -> Self {
        Self {
            provider,
            default_max_length,
        }
    }

    /// Renders the text for `target`.
    #[must_use]
    pub fn render(&self, target: &DeliveryTarget, payload: &NotificationPayload) -> OutboundMessage {
        let (sender, max_length) = match &target.config {
            ChannelConfig::Sms {
                sender_id,
                max_length,
            } => (sender_id.clone(), max_length.unwrap_or(self.default_max_length)),
            _ => (None, self.default_max_length),
        };

        let text = format!(
            "{}: {} - {}",
            payload.severity.as_str().to_uppercase(),
            payload.title,
            payload.message
        );

        OutboundMessage {
            channel: ChannelKind::Sms,
            to: target.address.clone(),
            from: sender,
            subject: None,
            body: truncate(&text, max_length),
            headers: BTreeMap::new(),
        }
    }
}

/// Truncates to `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    const MARKER: &str = "...";
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= MARKER.len() {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - MARKER.len()).collect();
    out.push_str(MARKER);
    out
}

impl ChannelDeliveryAdapter for SmsAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn send<'a>(&'a self, target: &'a DeliveryTarget, payload: &'a NotificationPayload) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let message = self.render(target, payload);
            self.provider.deliver(&message).await
        })
    }
}

/// The JSON body posted to webhooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Payload format version.
    pub version: String,
    /// Sending system.
    pub source: String,
    /// `triggered`, `acknowledged`, ...
    pub status: AlertStatus,
    /// The alert.
    pub alert: NotificationPayload,
}

impl WebhookPayload {
    /// Payload format version.
    pub const VERSION: &'static str = "1";

    /// Wraps a notification payload.
    #[must_use]
    pub fn from_payload(payload: &NotificationPayload) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            source: "sitewatch".to_string(),
            status: payload.status,
            alert: payload.clone(),
        }
    }
}

/// Webhook adapter. Each call is bounded by the channel or default timeout,
/// and a timeout is reported as a failure.
#[derive(Debug, Clone)]
pub struct WebhookAdapter {
    provider: Arc<dyn DeliveryProvider>,
    default_timeout: Duration,
}

impl WebhookAdapter {
    /// Creates a webhook adapter.
    #[must_use]
    pub fn new(provider: Arc<dyn DeliveryProvider>, default_timeout: Duration) -> Self {
        Self {
            provider,
            default_timeout,
        }
    }

    /// Returns the bound applied to `target`.
    #[must_use]
    pub fn timeout_for(&self, target: &DeliveryTarget) -> Duration {
        match &target.config {
            ChannelConfig::Webhook {
                timeout_ms: Some(ms),
                ..
            } => Duration::from_millis(*ms),
            _ => self.default_timeout,
        }
    }

    /// Renders the request for `target`.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::SerializationError` if the payload cannot be encoded.
    pub fn render(&self, target: &DeliveryTarget, payload: &NotificationPayload) -> Result<OutboundMessage> {
        let headers = match &target.config {
            ChannelConfig::Webhook { headers, .. } => headers.clone(),
            _ => BTreeMap::new(),
        };
        let body = serde_json::to_string(&WebhookPayload::from_payload(payload))?;

        Ok(OutboundMessage {
            channel: ChannelKind::Webhook,
            to: target.address.clone(),
            from: None,
            subject: None,
            body,
            headers,
        })
    }
}

impl ChannelDeliveryAdapter for WebhookAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn send<'a>(&'a self, target: &'a DeliveryTarget, payload: &'a NotificationPayload) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let message = self.render(target, payload)?;
            let timeout = self.timeout_for(target);
            match tokio::time::timeout(timeout, self.provider.deliver(&message)).await {
                Ok(result) => result,
                Err(_) => Err(AlertError::DeliveryTimeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

/// A provider that logs messages instead of sending them.
#[derive(Debug, Clone)]
pub struct LogProvider {
    name: String,
}

impl LogProvider {
    /// Creates a log provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogProvider {
    fn default() -> Self {
        Self::new("log")
    }
}

impl DeliveryProvider for LogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> DeliveryFuture<'a> {
        Box::pin(async move {
            info!(
                provider = %self.name,
                channel = %message.channel,
                to = %message.to,
                subject = ?message.subject,
                "notification"
            );
            debug!(body = %message.body, "notification body");
            Ok(DeliveryReceipt::generated(&self.name))
        })
    }
}

/// Posts webhook messages over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpWebhookProvider {
    client: reqwest::Client,
}

impl HttpWebhookProvider {
    /// Creates a provider with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider sharing an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl DeliveryProvider for HttpWebhookProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(&message.to)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(message.body.clone());
            for (name, value) in &message.headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await.map_err(|e| AlertError::NotificationFailed {
                reason: format!("webhook request to {} failed: {e}", message.to),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(AlertError::NotificationFailed {
                    reason: format!("webhook {} returned {status}", message.to),
                });
            }

            let message_id = response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map_or_else(|| format!("http-{}", Uuid::new_v4()), str::to_string);
            debug!(url = %message.to, %status, "webhook delivered");
            Ok(DeliveryReceipt { message_id })
        })
    }
}
