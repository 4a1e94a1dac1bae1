//! Error rule engine: turns the rows fetched for each rule into matches
//! ready for display.

use crate::format::truncate;
use chrono::{DateTime, Utc};
use pulse_core::{ErrorRule, EventRecord, FetchFailure, Platform, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const NO_MESSAGE: &str = "No message";

/// Builds session replay deep links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayLinker {
    host: String,
    project_id: String,
}

impl ReplayLinker {
    pub fn new(host: &str, project_id: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn replay_url(&self, session_id: &str) -> String {
        format!("{}/project/{}/replay/{}", self.host, self.project_id, session_id)
    }

    pub fn project_root(&self) -> String {
        format!("{}/project/{}", self.host, self.project_id)
    }

    /// `{host}/project/{id}/{path}` for dashboard and event links.
    pub fn project_url(&self, path: &str) -> String {
        format!(
            "{}/project/{}/{}",
            self.host,
            self.project_id,
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorMatch {
    pub event_name: String,
    pub platform: Platform,
    pub session_id: Option<String>,
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    /// Present, non-empty projected properties after truncation.
    pub projected_values: BTreeMap<String, String>,
    pub message: String,
    pub replay_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ErrorSectionStatus {
    Matched {
        matches: Vec<ErrorMatch>,
        /// The source returned as many rows as the rule allows.
        capped: bool,
    },
    Degraded {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSection {
    pub rule: ErrorRule,
    pub status: ErrorSectionStatus,
}

impl ErrorSection {
    pub fn matches(&self) -> &[ErrorMatch] {
        match &self.status {
            ErrorSectionStatus::Matched { matches, .. } => matches,
            ErrorSectionStatus::Degraded { .. } => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ErrorSectionStatus::Degraded { .. })
    }

    pub fn is_capped(&self) -> bool {
        matches!(self.status, ErrorSectionStatus::Matched { capped: true, .. })
    }

    /// Match counts per platform in report order. Unknown appears only when
    /// it has matches.
    pub fn platform_counts(&self) -> Vec<(Platform, u64)> {
        let mut counts: Vec<(Platform, u64)> =
            Platform::RECOGNIZED.iter().map(|p| (*p, 0)).collect();
        let mut unknown = 0u64;
        for m in self.matches() {
            match counts.iter_mut().find(|(p, _)| *p == m.platform) {
                Some((_, count)) => *count += 1,
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            counts.push((Platform::Unknown, unknown));
        }
        counts
    }
}

/// Everything the engine found in one window. `total` is the number of
/// matches actually received, capped per rule upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub window: TimeWindow,
    pub sections: Vec<ErrorSection>,
    pub total: u64,
}

impl ErrorReport {
    pub fn degraded_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_degraded()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.total == 0 && self.degraded_count() == 0
    }
}

/// The rows fetched for one rule, or why they could not be fetched.
pub struct RuleRows<'a> {
    pub rule: &'a ErrorRule,
    pub outcome: Result<&'a [EventRecord], &'a FetchFailure>,
}

pub struct ErrorRuleEngine {
    linker: ReplayLinker,
    truncate_at: usize,
}

impl ErrorRuleEngine {
    pub fn new(linker: ReplayLinker, truncate_at: usize) -> Self {
        Self {
            linker,
            truncate_at,
        }
    }

    /// Build sections in rule order. Rules without matches are left out;
    /// rules whose fetch failed are kept as degraded sections. Row order
    /// from the source is preserved.
    pub fn evaluate(&self, window: TimeWindow, inputs: Vec<RuleRows<'_>>) -> ErrorReport {
        let mut sections = Vec::new();
        let mut total = 0u64;

        for input in inputs {
            match input.outcome {
                Err(failure) => {
                    warn!(
                        rule = %input.rule.event_name,
                        error = %failure,
                        "Error rule fetch failed, section degraded"
                    );
                    sections.push(ErrorSection {
                        rule: input.rule.clone(),
                        status: ErrorSectionStatus::Degraded {
                            reason: failure.to_string(),
                        },
                    });
                }
                Ok(rows) if rows.is_empty() => {
                    debug!(rule = %input.rule.event_name, "No matches");
                }
                Ok(rows) => {
                    let matches: Vec<ErrorMatch> = rows
                        .iter()
                        .map(|record| self.build_match(input.rule, record))
                        .collect();
                    total += matches.len() as u64;
                    let capped = input.rule.max_per_window > 0
                        && matches.len() >= input.rule.max_per_window;
                    debug!(
                        rule = %input.rule.event_name,
                        matches = matches.len(),
                        capped,
                        "Error rule matched"
                    );
                    sections.push(ErrorSection {
                        rule: input.rule.clone(),
                        status: ErrorSectionStatus::Matched { matches, capped },
                    });
                }
            }
        }

        ErrorReport {
            window,
            sections,
            total,
        }
    }

    fn build_match(&self, rule: &ErrorRule, record: &EventRecord) -> ErrorMatch {
        let limit = rule.truncate_at.unwrap_or(self.truncate_at);
        let mut projected_values = BTreeMap::new();
        let mut parts = Vec::new();

        for key in &rule.projected_properties {
            let Some(text) = record.properties.get(key).and_then(property_text) else {
                continue;
            };
            let text = truncate(&text, limit);
            parts.push(text.clone());
            projected_values.insert(key.clone(), text);
        }

        let message = if parts.is_empty() {
            NO_MESSAGE.to_string()
        } else {
            parts.join(&rule.message_separator)
        };

        let session_id = record
            .session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        ErrorMatch {
            event_name: record.event_name.clone(),
            platform: record.platform,
            replay_url: session_id.as_deref().map(|s| self.linker.replay_url(s)),
            session_id,
            actor_id: record.actor_id.clone(),
            timestamp: record.timestamp,
            projected_values,
            message,
        }
    }
}

/// Render a property for display; `None` for null or blank values.
fn property_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use serde_json::json;

    fn window() -> TimeWindow {
        TimeWindow::daily(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
    }

    fn engine() -> ErrorRuleEngine {
        ErrorRuleEngine::new(ReplayLinker::new("https://app.posthog.com/", "42"), 100)
    }

    fn evaluate(rule: &ErrorRule, rows: &[EventRecord]) -> ErrorReport {
        engine().evaluate(
            window(),
            vec![RuleRows {
                rule,
                outcome: Ok(rows),
            }],
        )
    }

    fn record(
        event: &str,
        minute: i64,
        session: Option<&str>,
        props: serde_json::Value,
    ) -> EventRecord {
        EventRecord {
            event_name: event.to_string(),
            platform: Platform::Ios,
            actor_id: format!("user-{minute}"),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 23, 0, 0).unwrap()
                - Duration::minutes(minute),
            session_id: session.map(str::to_string),
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_projection_skips_missing_and_blank_values() {
        let event = "buy_provider_availability_error";
        let rule = ErrorRule::new(event, "Payment Error", "💳", &["error", "provider", "code"])
            .with_separator(" · ");
        let props = json!({"error": "unavailable", "provider": "", "other": "x"});
        let report = evaluate(&rule, &[record(event, 1, None, props)]);

        let m = &report.sections[0].matches()[0];
        assert_eq!(m.projected_values.len(), 1);
        assert_eq!(m.projected_values["error"], "unavailable");
        assert_eq!(m.message, "unavailable");
        assert_eq!(m.replay_url, None);
    }

    #[test]
    fn test_message_joins_in_projection_order() {
        let event = "send_transaction_result";
        let rule = ErrorRule::new(event, "Send Failure", "📤", &["error", "hash"]);
        let props = json!({"hash": "0xabc", "error": "nonce too low"});
        let report = evaluate(&rule, &[record(event, 1, Some("s-1"), props)]);

        let m = &report.sections[0].matches()[0];
        assert_eq!(m.message, "nonce too low | 0xabc");
        assert_eq!(
            m.replay_url.as_deref(),
            Some("https://app.posthog.com/project/42/replay/s-1")
        );
    }

    #[test]
    fn test_missing_message_and_long_values() {
        let rule = ErrorRule::new("$exception", "Exception", "💥", &["$exception_message"]);
        let long = "x".repeat(150);
        let rows = vec![
            record("$exception", 1, None, json!({})),
            record("$exception", 2, None, json!({"$exception_message": long})),
        ];
        let report = evaluate(&rule, &rows);

        let matches = report.sections[0].matches();
        assert_eq!(matches[0].message, "No message");
        assert_eq!(matches[1].message.chars().count(), 103);
        assert!(matches[1].message.ends_with("..."));
    }

    #[test]
    fn test_rule_truncation_override() {
        let mut rule = ErrorRule::new("app_error_captured", "App Error", "🐛", &["message"]);
        rule.truncate_at = Some(80);
        let props = json!({"message": "y".repeat(90)});
        let report = evaluate(&rule, &[record("app_error_captured", 1, None, props)]);
        assert_eq!(report.sections[0].matches()[0].message.chars().count(), 83);
    }

    #[test]
    fn test_empty_rules_omitted_and_order_preserved() {
        let first = ErrorRule::new("app_error_captured", "App Error", "🐛", &["message"]);
        let second = ErrorRule::new("$exception", "Exception", "💥", &["$exception_message"]);
        let third = ErrorRule::new("$rageclick", "Rage Click", "😤", &[]);
        let exceptions = vec![record("$exception", 1, None, json!({}))];
        let clicks = vec![
            record("$rageclick", 1, None, json!({})),
            record("$rageclick", 5, None, json!({})),
        ];

        let report = engine().evaluate(
            window(),
            vec![
                RuleRows {
                    rule: &first,
                    outcome: Ok(&[]),
                },
                RuleRows {
                    rule: &second,
                    outcome: Ok(&exceptions),
                },
                RuleRows {
                    rule: &third,
                    outcome: Ok(&clicks),
                },
            ],
        );

        let names: Vec<_> = report
            .sections
            .iter()
            .map(|s| s.rule.event_name.as_str())
            .collect();
        assert_eq!(names, vec!["$exception", "$rageclick"]);
        assert_eq!(report.total, 3);
        // newest-first order from the source is kept
        let clicks = report.sections[1].matches();
        assert!(clicks[0].timestamp > clicks[1].timestamp);
    }

    #[test]
    fn test_total_reflects_received_rows_when_capped() {
        let rule = ErrorRule::new("$exception", "Exception", "💥", &[]).with_cap(2);
        // The source already applied the cap: 3 matching rows, 2 returned.
        let rows = vec![
            record("$exception", 1, None, json!({})),
            record("$exception", 2, None, json!({})),
        ];
        let report = evaluate(&rule, &rows);

        assert_eq!(report.total, 2);
        assert_eq!(report.sections[0].matches().len(), 2);
        assert!(report.sections[0].is_capped());
    }

    #[test]
    fn test_fetch_failure_is_degraded_not_clean() {
        let rule = ErrorRule::new("$exception", "Exception", "💥", &[]);
        let failure = FetchFailure::Backend {
            status: 502,
            body: "bad gateway".to_string(),
        };
        let report = engine().evaluate(
            window(),
            vec![RuleRows {
                rule: &rule,
                outcome: Err(&failure),
            }],
        );

        assert_eq!(report.total, 0);
        assert_eq!(report.degraded_count(), 1);
        assert!(!report.is_clean());
        assert!(report.sections[0].is_degraded());
    }

    #[test]
    fn test_platform_counts_include_unknown_only_when_present() {
        let rule = ErrorRule::new("$exception", "Exception", "💥", &[]);
        let mut rows = vec![
            record("$exception", 1, None, json!({})),
            record("$exception", 2, None, json!({})),
        ];
        rows[1].platform = Platform::Android;
        let report = evaluate(&rule, &rows);
        assert_eq!(
            report.sections[0].platform_counts(),
            vec![(Platform::Ios, 1), (Platform::Android, 1)]
        );

        rows.push(record("$exception", 3, None, json!({})));
        rows[2].platform = Platform::Unknown;
        let report = evaluate(&rule, &rows);
        assert_eq!(
            report.sections[0].platform_counts().last(),
            Some(&(Platform::Unknown, 1))
        );
    }

    #[test]
    fn test_project_url() {
        let linker = ReplayLinker::new("https://eu.posthog.com", "7");
        assert_eq!(
            linker.project_url("/dashboard/1"),
            "https://eu.posthog.com/project/7/dashboard/1"
        );
    }
}
