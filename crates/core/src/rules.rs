//! Declarative report tables: error rules, funnels and completion metrics.

use crate::predicate::{ComparisonOperator, Predicate};
use serde::{Deserialize, Serialize};

/// One row of the error rule table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRule {
    pub event_name: String,
    pub display_name: String,
    pub emoji: String,
    #[serde(default)]
    pub predicate: Option<Predicate>,
    /// Properties shown for each match, in display order.
    #[serde(default)]
    pub projected_properties: Vec<String>,
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,
    /// Overrides the engine-wide truncation length.
    #[serde(default)]
    pub truncate_at: Option<usize>,
    #[serde(default = "default_message_separator")]
    pub message_separator: String,
}

impl ErrorRule {
    pub fn new(event_name: &str, display_name: &str, emoji: &str, projected: &[&str]) -> Self {
        Self {
            event_name: event_name.to_string(),
            display_name: display_name.to_string(),
            emoji: emoji.to_string(),
            predicate: None,
            projected_properties: projected.iter().map(|p| p.to_string()).collect(),
            max_per_window: default_max_per_window(),
            truncate_at: None,
            message_separator: default_message_separator(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_separator(mut self, separator: &str) -> Self {
        self.message_separator = separator.to_string();
        self
    }

    pub fn with_cap(mut self, max_per_window: usize) -> Self {
        self.max_per_window = max_per_window;
        self
    }

    /// `"💥 Exception"`
    pub fn title(&self) -> String {
        if self.emoji.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} {}", self.emoji, self.display_name)
        }
    }
}

/// A start → end event pair measured for conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunnelDefinition {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub emoji: String,
    /// Short description shown next to the label, e.g. `deeplink → complete`.
    #[serde(default)]
    pub caption: String,
    pub start_event: String,
}

/// A completion event reported with raw counts, deltas and the funnels
/// that lead to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionMetric {
    pub key: String,
    pub title: String,
    pub emoji: String,
    pub event: String,
    #[serde(default)]
    pub compare_total: bool,
    #[serde(default)]
    pub funnels: Vec<FunnelDefinition>,
}

/// Footer link relative to the project, e.g. `dashboard/859640`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkDefinition {
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardDefinition {
    pub label: String,
    pub id: String,
}

fn default_max_per_window() -> usize {
    100
}
fn default_message_separator() -> String {
    " | ".to_string()
}

/// The error events every mobile report watches.
pub fn default_error_rules() -> Vec<ErrorRule> {
    let error_set =
        Predicate::property("error", ComparisonOperator::IsSet, serde_json::Value::Null);
    vec![
        ErrorRule::new("app_error_captured", "App Error", "🐛", &["message"]),
        ErrorRule::new("$exception", "Exception", "💥", &["$exception_message"]),
        ErrorRule::new(
            "buy_provider_availability_error",
            "Payment Error",
            "💳",
            &["error", "provider"],
        )
        .with_separator(" · "),
        ErrorRule::new("send_transaction_result", "Send Failure", "📤", &["error", "hash"])
            .with_predicate(error_set.clone()),
        ErrorRule::new("swap_execution_result", "Swap Failure", "🔄", &["error"])
            .with_predicate(error_set),
        ErrorRule::new("$rageclick", "Rage Click", "😤", &["message", "$current_url"]),
    ]
}

pub fn default_completion_metrics() -> Vec<CompletionMetric> {
    vec![
        CompletionMetric {
            key: "buy".to_string(),
            title: "Buy Completions".to_string(),
            emoji: "💰".to_string(),
            event: "buy_payment_state_changed".to_string(),
            compare_total: true,
            funnels: vec![
                FunnelDefinition {
                    key: "standard".to_string(),
                    label: "Standard Flow".to_string(),
                    emoji: "📊".to_string(),
                    caption: "buy_form_viewed → complete".to_string(),
                    start_event: "buy_form_viewed".to_string(),
                },
                FunnelDefinition {
                    key: "deeplink".to_string(),
                    label: "Deeplink Flow".to_string(),
                    emoji: "🔗".to_string(),
                    caption: "deeplink → complete".to_string(),
                    start_event: "deeplink_intent_viewed".to_string(),
                },
            ],
        },
        CompletionMetric {
            key: "onboarding".to_string(),
            title: "Onboarding Completions".to_string(),
            emoji: "🚀".to_string(),
            event: "auth_session_ready".to_string(),
            compare_total: false,
            funnels: vec![FunnelDefinition {
                key: "login".to_string(),
                label: "Funnel Conversion".to_string(),
                emoji: "📊".to_string(),
                caption: "login_screen → session_ready".to_string(),
                start_event: "auth_login_screen_viewed".to_string(),
            }],
        },
    ]
}

pub fn default_daily_links() -> Vec<LinkDefinition> {
    vec![
        LinkDefinition {
            label: "Buy Dashboard".to_string(),
            path: "dashboard/859544".to_string(),
        },
        LinkDefinition {
            label: "Onboarding Dashboard".to_string(),
            path: "dashboard/859543".to_string(),
        },
        LinkDefinition {
            label: "Errors".to_string(),
            path: "dashboard/859640".to_string(),
        },
    ]
}

pub fn default_error_links() -> Vec<LinkDefinition> {
    vec![
        LinkDefinition {
            label: "View Error Dashboard".to_string(),
            path: "dashboard/859640".to_string(),
        },
        LinkDefinition {
            label: "View All Exceptions".to_string(),
            path: "events?eventType=$exception".to_string(),
        },
    ]
}
