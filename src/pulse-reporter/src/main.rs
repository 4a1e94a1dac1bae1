//! Pulse Reporter: posts PostHog metrics and error alerts to Slack.
//!
//! One invocation produces one report; scheduling is left to cron or CI.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pulse_core::{AppConfig, RunMode};
use pulse_integrations::{ChatSink, PostHogClient, SlackWebhook, StdoutSink};
use pulse_pipeline::{self_test, RunContext, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const EXIT_CONFIG: u8 = 1;
const EXIT_DELIVERY: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "pulse-reporter")]
#[command(about = "PostHog metrics and error reports for Slack")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ./pulse.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the Slack payload instead of posting it
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    /// PostHog personal API key (overrides config)
    #[arg(long, env = "POSTHOG_API_KEY", hide_env_values = true)]
    posthog_api_key: Option<String>,

    /// PostHog project id (overrides config)
    #[arg(long, env = "POSTHOG_PROJECT_ID")]
    posthog_project_id: Option<String>,

    /// PostHog host (overrides config)
    #[arg(long, env = "POSTHOG_HOST")]
    posthog_host: Option<String>,

    /// Webhook for the daily report (overrides config)
    #[arg(long, env = "SLACK_WEBHOOK_DAILY", hide_env_values = true)]
    slack_webhook_daily: Option<String>,

    /// Webhook for error alerts (overrides config)
    #[arg(long, env = "SLACK_WEBHOOK_ERRORS", hide_env_values = true)]
    slack_webhook_errors: Option<String>,

    /// Webhook for the dashboard digest (overrides config)
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    slack_webhook_url: Option<String>,

    /// Error monitoring dashboard id for the digest
    #[arg(long, env = "DASHBOARD_ERROR_MONITORING")]
    dashboard_error_monitoring: Option<String>,

    /// Buy flow dashboard id for the digest
    #[arg(long, env = "DASHBOARD_BUY_FLOW")]
    dashboard_buy_flow: Option<String>,

    /// UI and UX health dashboard id for the digest
    #[arg(long, env = "DASHBOARD_UI_UX_HEALTH")]
    dashboard_ui_ux_health: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Yesterday's mobile stats
    Daily(ModeArgs),
    /// Errors from the last poll window
    Errors(ModeArgs),
    /// Headline numbers from the configured dashboards
    Digest(ModeArgs),
}

#[derive(Args, Debug)]
struct ModeArgs {
    /// Post a canned message to check the webhook
    #[arg(long, default_value_t = false)]
    test: bool,
}

impl Command {
    fn mode(&self) -> RunMode {
        match self {
            Command::Daily(_) => RunMode::Daily,
            Command::Errors(_) => RunMode::Errors,
            Command::Digest(_) => RunMode::Digest,
        }
    }

    fn is_test(&self) -> bool {
        match self {
            Command::Daily(args) | Command::Errors(args) | Command::Digest(args) => args.test,
        }
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    let overrides = [
        (&cli.posthog_api_key, &mut config.posthog.api_key),
        (&cli.posthog_project_id, &mut config.posthog.project_id),
        (&cli.slack_webhook_daily, &mut config.slack.daily_webhook),
        (&cli.slack_webhook_errors, &mut config.slack.errors_webhook),
        (&cli.slack_webhook_url, &mut config.slack.digest_webhook),
    ];
    for (value, target) in overrides {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            *target = Some(value.to_string());
        }
    }
    if let Some(host) = cli.posthog_host.as_deref().filter(|h| !h.trim().is_empty()) {
        config.posthog.host = host.to_string();
    }

    let dashboards = [
        ("🚨 Error Monitoring", &cli.dashboard_error_monitoring),
        ("💰 Buy Flow Performance", &cli.dashboard_buy_flow),
        ("🖥️ UI & UX Health", &cli.dashboard_ui_ux_health),
    ];
    for (label, id) in dashboards {
        if let Some(id) = id.as_deref() {
            config.digest.add_dashboard(label, id);
        }
    }
}

/// Load configuration and wire up the collaborators for `mode`. Every error
/// here is a configuration error.
fn prepare(cli: &Cli, mode: RunMode) -> anyhow::Result<RunContext> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut config, cli);

    let credentials = config.credentials(mode, !cli.dry_run)?;
    info!(
        mode = mode.as_str(),
        host = %credentials.host,
        project_id = %credentials.project_id,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    let client = Arc::new(PostHogClient::new(&credentials, &config.posthog)?);
    let sink: Arc<dyn ChatSink> = if cli.dry_run {
        Arc::new(StdoutSink::new())
    } else {
        let url = credentials
            .webhook_url
            .as_deref()
            .context("no webhook configured for this mode")?;
        Arc::new(SlackWebhook::new(
            url,
            Duration::from_secs(config.posthog.request_timeout_secs),
        )?)
    };

    Ok(RunContext::new(config, &credentials, client.clone(), client, sink))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mode = cli.command.mode();

    let ctx = match prepare(&cli, mode) {
        Ok(ctx) => ctx,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, "Configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let outcome = if cli.command.is_test() {
        self_test::run(&ctx, mode).await
    } else {
        pulse_pipeline::run(&ctx, mode, chrono::Utc::now()).await
    };

    match outcome {
        RunOutcome::DeliveryFailed { failure } => {
            error!(error = %failure, "Run failed");
            ExitCode::from(EXIT_DELIVERY)
        }
        RunOutcome::Skipped { reason } => {
            info!(reason = %reason, "Nothing to post");
            ExitCode::SUCCESS
        }
        RunOutcome::Posted { blocks } => {
            info!(blocks, "Done");
            ExitCode::SUCCESS
        }
    }
}
