//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sitewatch_alerts::SubscriptionTier;

/// Sitewatch - building alert evaluation and notification escalation.
#[derive(Parser, Debug, Clone)]
#[command(name = "sitewatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Alerting configuration file (TOML).
    #[arg(short, long, env = "SITEWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Json, global = true)]
    pub format: Format,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    Table,
    /// JSON output for scripting.
    #[default]
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Evaluate alert configurations against sensor readings.
    Evaluate(EvaluateArgs),

    /// Validate an alert configuration against a subscription tier.
    Validate(ValidateArgs),

    /// Send the initial notifications for an alert.
    Notify(NotifyArgs),

    /// Run one escalation stage for an alert.
    Escalate(EscalateArgs),

    /// Show when each escalation stage of a policy falls due.
    PlanEscalation(PlanEscalationArgs),
}

/// Arguments for `evaluate`.
#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// JSON array of alert configurations.
    #[arg(long)]
    pub configurations: PathBuf,

    /// JSON evaluation context with sensor readings.
    #[arg(long)]
    pub context: PathBuf,

    /// JSON array of previously raised alerts, used for cooldown deduplication.
    #[arg(long)]
    pub alerts: Option<PathBuf>,
}

/// Arguments for `validate`.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// JSON alert configuration.
    #[arg(long)]
    pub configuration: PathBuf,

    /// Subscription tier of the owning organization.
    #[arg(long, value_enum, default_value_t = Tier::Free)]
    pub tier: Tier,
}

/// Arguments for `notify`.
#[derive(Args, Debug, Clone)]
pub struct NotifyArgs {
    /// JSON notification settings.
    #[arg(long)]
    pub settings: PathBuf,

    /// JSON alert instance.
    #[arg(long)]
    pub alert: PathBuf,

    /// Routing instant (RFC 3339); defaults to now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Log every message instead of calling webhooks.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `escalate`.
#[derive(Args, Debug, Clone)]
pub struct EscalateArgs {
    /// JSON alert instance.
    #[arg(long)]
    pub alert: PathBuf,

    /// JSON escalation policy.
    #[arg(long)]
    pub policy: PathBuf,

    /// Zero-based stage to run.
    #[arg(long)]
    pub stage: usize,

    /// Evaluation instant (RFC 3339); defaults to now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Log every message instead of calling webhooks.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `plan-escalation`.
#[derive(Args, Debug, Clone)]
pub struct PlanEscalationArgs {
    /// JSON alert instance.
    #[arg(long)]
    pub alert: PathBuf,

    /// JSON escalation policy.
    #[arg(long)]
    pub policy: PathBuf,

    /// Evaluation instant (RFC 3339); defaults to now.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,
}

/// Subscription tier as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tier {
    /// Free tier.
    Free,
    /// Professional tier.
    Professional,
    /// Enterprise tier.
    Enterprise,
}

impl From<Tier> for SubscriptionTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self::Free,
            Tier::Professional => Self::Professional,
            Tier::Enterprise => Self::Enterprise,
        }
    }
}
