//! Alert evaluation and notification escalation for sitewatch.
//!
//! `sitewatch-alerts` evaluates alert configurations against building sensor
//! readings and delivers the resulting alerts over email, SMS and webhooks.
//!
//! # Features
//!
//! - **Rules**: Conditions over aggregated sensor data, combined with AND/OR
//! - **Deduplication**: A rule re-firing within its cooldown returns the existing alert
//! - **Routing**: Channel priority filters, quiet hours, on-call shifts and frequency limits
//! - **Delivery**: Concurrent fan-out with per-channel timeouts and failure isolation
//! - **Escalation**: Explicit stage-by-stage escalation driven by an external scheduler
//! - **Validation**: Structured configuration checks against subscription tiers
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use sitewatch_alerts::{
//!     AlertConfiguration, AlertRule, AlertRuleEngine, AlertSeverity, ComparisonOperator,
//!     Condition, EngineConfig, EvaluationContext, InMemoryAlertStore,
//! };
//! use sitewatch_metrics::{AggregationFunction, MetricSelector, SensorReading, TimeAggregation};
//!
//! let rule = AlertRule::builder("Server room too hot")
//!     .priority(AlertSeverity::High)
//!     .condition(Condition::new(
//!         MetricSelector::new("temperature").unwrap().with_sensor("t-1"),
//!         ComparisonOperator::GreaterThan,
//!         27.0,
//!         TimeAggregation::new(AggregationFunction::Average, 15, 1).unwrap(),
//!     ))
//!     .build()
//!     .unwrap();
//! let configuration = AlertConfiguration::new("Server room", "user-1", "org-1", vec![rule]);
//!
//! let now = Utc::now();
//! let context = EvaluationContext::new(
//!     now,
//!     vec![SensorReading::new("t-1", now - Duration::minutes(2), 31.5, "C")],
//! );
//!
//! let engine = AlertRuleEngine::new(Arc::new(InMemoryAlertStore::new()), EngineConfig::default());
//! let alerts = engine.evaluate_alerts(&[configuration], &context);
//! assert_eq!(alerts.len(), 1);
//! assert_eq!(alerts[0].severity, AlertSeverity::High);
//! ```

#![forbid(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/sitewatch-alerts/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod alert;
pub mod channels;
pub mod condition;
pub mod config;
pub mod dedup;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod factory;
pub mod quiet_hours;
pub mod router;
pub mod rule;
pub mod schedule;
pub mod settings;
pub mod store;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use alert::{
    AlertContext, AlertInstance, AlertStatus, DeliveryStatus, MetricValueResult, NotificationLog,
};
pub use channels::{
    ChannelDeliveryAdapter, DeliveryProvider, DeliveryReceipt, DeliveryTarget, EmailAdapter,
    HttpWebhookProvider, LogProvider, NotificationPayload, OutboundMessage, SmsAdapter,
    WebhookAdapter, WebhookPayload,
};
pub use condition::{AnomalyClassifier, ConditionEvaluator};
pub use config::{AlertingConfig, DeliveryConfig, EngineConfig};
pub use delivery::NotificationDeliveryService;
pub use engine::AlertRuleEngine;
pub use error::{AlertError, Result};
pub use escalation::{
    EscalationAction, EscalationPolicy, EscalationScheduler, EscalationStage, HaltReason,
};
pub use quiet_hours::QuietHours;
pub use router::{DeliveryState, NotificationRouter, RoutingPlan, SuppressionReason};
pub use rule::{RuleEvaluator, RuleOutcome};
pub use schedule::{BusinessHours, ClockTime, OnCallSchedule};
pub use settings::{
    ChannelConfig, ChannelKind, ChannelSettings, ContactMethods, FrequencyLimits,
    NotificationSettings, Recipient,
};
pub use store::{AlertStore, DeliveryRecord, InMemoryAlertStore, StoreOutcome};
pub use types::{
    AlertConfiguration, AlertRule, AlertRuleBuilder, AlertSeverity, BusinessImpact,
    ComparisonOperator, Condition, ConfigurationMetadata, ConfigurationStatus, EvaluationContext,
    ImpactLevel, LogicalOperator, MaintenanceWindow, OccupancyData, SystemStatus, Threshold,
    WeatherData,
};
pub use validation::{
    StaticSubscriptionProvider, SubscriptionProvider, SubscriptionTier, TierLimits,
    ValidationIssue, ValidationReport,
};
