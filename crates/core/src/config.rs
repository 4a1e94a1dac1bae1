use crate::error::{PulseError, PulseResult};
use crate::rules::{
    default_completion_metrics, default_daily_links, default_error_links, default_error_rules,
    CompletionMetric, DashboardDefinition, ErrorRule, LinkDefinition,
};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `PULSE__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub posthog: PostHogConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub daily: DailyConfig,
    #[serde(default)]
    pub errors: ErrorAlertConfig,
    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostHogConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Upper bound on concurrent backend queries per run.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Row limit applied to queries that carry none of their own.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub daily_webhook: Option<String>,
    #[serde(default)]
    pub errors_webhook: Option<String>,
    #[serde(default)]
    pub digest_webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyConfig {
    #[serde(default = "default_active_users_event")]
    pub active_users_event: String,
    #[serde(default = "default_completion_metrics")]
    pub completions: Vec<CompletionMetric>,
    /// Row limit for the per-rule error summary of the daily report.
    #[serde(default = "default_error_row_limit")]
    pub error_row_limit: usize,
    #[serde(default = "default_daily_links")]
    pub links: Vec<LinkDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorAlertConfig {
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u32,
    #[serde(default = "default_truncate_at")]
    pub truncate_at: usize,
    /// Post an all-clear message when a poll finds nothing.
    #[serde(default)]
    pub post_when_clean: bool,
    #[serde(default = "default_error_rules")]
    pub rules: Vec<ErrorRule>,
    #[serde(default = "default_error_links")]
    pub links: Vec<LinkDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub dashboards: Vec<DashboardDefinition>,
    #[serde(default = "default_tiles_per_dashboard")]
    pub tiles_per_dashboard: usize,
}

impl DigestConfig {
    /// Append a dashboard unless `id` is blank or already listed.
    pub fn add_dashboard(&mut self, label: &str, id: &str) {
        let id = id.trim();
        if id.is_empty() || self.dashboards.iter().any(|d| d.id == id) {
            return;
        }
        self.dashboards.push(DashboardDefinition {
            label: label.to_string(),
            id: id.to_string(),
        });
    }
}

/// Which report a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Daily,
    Errors,
    Digest,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Daily => "daily",
            RunMode::Errors => "errors",
            RunMode::Digest => "digest",
        }
    }
}

/// Settings a run cannot start without.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub host: String,
    pub api_key: String,
    pub project_id: String,
    /// Absent only for dry runs.
    pub webhook_url: Option<String>,
}

// Default functions
fn default_host() -> String {
    "https://app.posthog.com".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_max_rows() -> usize {
    50_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_run_timeout_secs() -> u64 {
    240
}
fn default_active_users_event() -> String {
    "app_launched".to_string()
}
fn default_error_row_limit() -> usize {
    10_000
}
fn default_poll_minutes() -> u32 {
    10
}
fn default_truncate_at() -> usize {
    100
}
fn default_tiles_per_dashboard() -> usize {
    5
}

impl Default for PostHogConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_key: None,
            project_id: None,
            max_concurrency: default_max_concurrency(),
            max_rows: default_max_rows(),
            request_timeout_secs: default_request_timeout_secs(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            active_users_event: default_active_users_event(),
            completions: default_completion_metrics(),
            error_row_limit: default_error_row_limit(),
            links: default_daily_links(),
        }
    }
}

impl Default for ErrorAlertConfig {
    fn default() -> Self {
        Self {
            poll_minutes: default_poll_minutes(),
            truncate_at: default_truncate_at(),
            post_when_clean: false,
            rules: default_error_rules(),
            links: default_error_links(),
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            dashboards: Vec::new(),
            tiles_per_dashboard: default_tiles_per_dashboard(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file and environment
    /// variables. The file is required only when a path is given explicitly.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("pulse").required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix("PULSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        config.try_deserialize()
    }

    pub fn webhook_for(&self, mode: RunMode) -> Option<&str> {
        let webhook = match mode {
            RunMode::Daily => &self.slack.daily_webhook,
            RunMode::Errors => &self.slack.errors_webhook,
            RunMode::Digest => &self.slack.digest_webhook,
        };
        webhook.as_deref().filter(|w| !w.trim().is_empty())
    }

    /// Check that everything `mode` needs is present, reporting every missing
    /// setting at once.
    pub fn credentials(&self, mode: RunMode, require_webhook: bool) -> PulseResult<Credentials> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let api_key = present(&self.posthog.api_key);
        let project_id = present(&self.posthog.project_id);
        let webhook_url = self.webhook_for(mode).map(str::to_string);

        let mut missing = Vec::new();
        if api_key.is_none() {
            missing.push("POSTHOG_API_KEY");
        }
        if project_id.is_none() {
            missing.push("POSTHOG_PROJECT_ID");
        }
        if require_webhook && webhook_url.is_none() {
            missing.push(match mode {
                RunMode::Daily => "SLACK_WEBHOOK_DAILY",
                RunMode::Errors => "SLACK_WEBHOOK_ERRORS",
                RunMode::Digest => "SLACK_WEBHOOK_URL",
            });
        }
        if mode == RunMode::Digest && self.digest.dashboards.is_empty() {
            missing.push("at least one digest dashboard");
        }

        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) if missing.is_empty() => Ok(Credentials {
                host: self.posthog.host.trim_end_matches('/').to_string(),
                api_key,
                project_id,
                webhook_url,
            }),
            _ => Err(PulseError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.posthog.api_key = Some("phx_test".to_string());
        config.posthog.project_id = Some("4242".to_string());
        config.slack.errors_webhook = Some("https://hooks.slack.test/errors".to_string());
        config
    }

    #[test]
    fn test_defaults_carry_rule_tables() {
        let config = AppConfig::default();
        assert_eq!(config.errors.rules.len(), 6);
        assert_eq!(config.errors.poll_minutes, 10);
        assert_eq!(config.daily.completions.len(), 2);
        assert_eq!(config.daily.completions[0].funnels.len(), 2);
        assert_eq!(config.posthog.host, "https://app.posthog.com");
    }

    #[test]
    fn test_credentials_report_every_missing_setting() {
        let err = AppConfig::default()
            .credentials(RunMode::Daily, true)
            .unwrap_err()
            .to_string();
        assert!(err.contains("POSTHOG_API_KEY"));
        assert!(err.contains("POSTHOG_PROJECT_ID"));
        assert!(err.contains("SLACK_WEBHOOK_DAILY"));
    }

    #[test]
    fn test_credentials_for_configured_mode() {
        let creds = configured().credentials(RunMode::Errors, true).unwrap();
        assert_eq!(creds.project_id, "4242");
        assert_eq!(
            creds.webhook_url.as_deref(),
            Some("https://hooks.slack.test/errors")
        );
    }

    #[test]
    fn test_dry_run_does_not_need_webhook() {
        assert!(configured().credentials(RunMode::Daily, true).is_err());
        assert!(configured().credentials(RunMode::Daily, false).is_ok());
    }

    #[test]
    fn test_digest_needs_a_dashboard() {
        let mut config = configured();
        config.slack.digest_webhook = Some("https://hooks.slack.test/digest".to_string());
        assert!(config.credentials(RunMode::Digest, true).is_err());

        config.digest.dashboards.push(DashboardDefinition {
            label: "🚨 Error Monitoring".to_string(),
            id: "77".to_string(),
        });
        assert!(config.credentials(RunMode::Digest, true).is_ok());
    }

    #[test]
    fn test_added_dashboards_skip_blanks_and_duplicates() {
        let mut config = configured();
        config.digest.add_dashboard("💰 Buy Flow Performance", " 859544 ");
        config.digest.add_dashboard("💰 Buy Flow Performance", "859544");
        config.digest.add_dashboard("🖥️ UI & UX Health", "  ");

        assert_eq!(config.digest.dashboards.len(), 1);
        assert_eq!(config.digest.dashboards[0].id, "859544");
        assert!(config.credentials(RunMode::Digest, false).is_ok());
    }
}
