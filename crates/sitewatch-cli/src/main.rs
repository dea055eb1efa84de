//! Sitewatch CLI binary entrypoint.
//!
//! This is the main entry point for the `sitewatch` command-line tool.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitewatch_alerts::{
    AlertConfiguration, AlertInstance, AlertRuleEngine, DeliveryConfig, DeliveryProvider,
    EscalationPolicy, EvaluationContext, HttpWebhookProvider, InMemoryAlertStore, LogProvider,
    NotificationDeliveryService, NotificationSettings, StaticSubscriptionProvider,
};
use sitewatch_cli::cli::{Cli, Commands};
use sitewatch_cli::commands::{
    EscalateCommand, EvaluateCommand, NotifyCommand, PlanEscalationCommand, ValidateCommand,
};
use sitewatch_cli::input::{load_config, read_json};
use sitewatch_cli::output::OutputFormat;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.json) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("sitewatch=info".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref()).context("loading alerting configuration")?;
    debug!(config = ?cli.config, "configuration loaded");

    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Evaluate(args) => {
            let configurations: Vec<AlertConfiguration> =
                load(&args.configurations, "alert configurations")?;
            let context: EvaluationContext = load(&args.context, "evaluation context")?;
            let store = match &args.alerts {
                Some(path) => {
                    let alerts: Vec<AlertInstance> = load(path, "existing alerts")?;
                    InMemoryAlertStore::with_alerts(alerts)
                }
                None => InMemoryAlertStore::new(),
            };

            let engine = AlertRuleEngine::new(Arc::new(store), config.engine);
            EvaluateCommand::new(&engine).execute(&mut stdout, &format, &configurations, &context)?;
        }
        Commands::Validate(args) => {
            let configuration: AlertConfiguration =
                load(&args.configuration, "alert configuration")?;

            let engine = AlertRuleEngine::new(Arc::new(InMemoryAlertStore::new()), config.engine)
                .with_subscriptions(Arc::new(StaticSubscriptionProvider::new(args.tier.into())));
            ValidateCommand::new(&engine).execute(&mut stdout, &format, &configuration)?;
        }
        Commands::Notify(args) => {
            let settings: NotificationSettings = load(&args.settings, "notification settings")?;
            let alert: AlertInstance = load(&args.alert, "alert")?;

            let service = delivery_service(&config.delivery, &alert, args.dry_run);
            NotifyCommand::new(&service)
                .execute(&mut stdout, &format, &settings, &alert, args.now.unwrap_or_else(Utc::now))
                .await?;
        }
        Commands::Escalate(args) => {
            let alert: AlertInstance = load(&args.alert, "alert")?;
            let policy: EscalationPolicy = load(&args.policy, "escalation policy")?;

            let service = delivery_service(&config.delivery, &alert, args.dry_run);
            EscalateCommand::new(&service)
                .execute(
                    &mut stdout,
                    &format,
                    &alert,
                    &policy,
                    args.stage,
                    args.now.unwrap_or_else(Utc::now),
                )
                .await?;
        }
        Commands::PlanEscalation(args) => {
            let alert: AlertInstance = load(&args.alert, "alert")?;
            let policy: EscalationPolicy = load(&args.policy, "escalation policy")?;

            PlanEscalationCommand::new().execute(
                &mut stdout,
                &format,
                &alert,
                &policy,
                args.now.unwrap_or_else(Utc::now),
            )?;
        }
    }

    Ok(())
}

fn load<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    read_json(path).with_context(|| format!("reading {what} from {}", path.display()))
}

/// Email and SMS go to the log; webhooks are posted unless this is a dry run.
fn delivery_service(
    config: &DeliveryConfig,
    alert: &AlertInstance,
    dry_run: bool,
) -> NotificationDeliveryService {
    let log: Arc<dyn DeliveryProvider> = Arc::new(LogProvider::default());
    let webhook: Arc<dyn DeliveryProvider> = if dry_run {
        Arc::new(LogProvider::new("dry-run"))
    } else {
        Arc::new(HttpWebhookProvider::new())
    };

    NotificationDeliveryService::with_providers(
        Arc::new(InMemoryAlertStore::with_alerts([alert.clone()])),
        config.clone(),
        Arc::clone(&log),
        log,
        webhook,
    )
}
