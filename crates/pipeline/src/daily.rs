//! Daily mobile stats: active users, completions with funnels, error
//! summary and dashboard links for yesterday (UTC).

use crate::context::RunContext;
use crate::outcome::RunOutcome;
use chrono::NaiveDate;
use pulse_core::{
    CompletionMetric, ErrorRule, EventRecord, FetchFailure, PerPlatform, RowQuery, TimeWindow,
};
use pulse_integrations::{FetchPlan, FetchResults};
use pulse_reporting::aggregates::{event_counts, unique_actors};
use pulse_reporting::{
    AttributionReconciler, AttributionSummary, ComparisonMetric, CountsSection, ErrorRuleEngine,
    ErrorStyle, ErrorsSection, FunnelCalculator, FunnelEntry, FunnelSpec, PlatformComparison,
    Report, ReportAssembler, ReportSection, RuleRows,
};
use tracing::{info, warn};

const ACTIVE_CURRENT: &str = "active:current";
const ACTIVE_PREVIOUS: &str = "active:previous";

fn completion_key(metric: &CompletionMetric, period: &str) -> String {
    format!("completion:{}:{period}", metric.key)
}

fn funnel_start_key(metric: &CompletionMetric, funnel: &str) -> String {
    format!("funnel:{}:{funnel}", metric.key)
}

fn error_key(index: usize, rule: &ErrorRule) -> String {
    format!("error:{index}:{}", rule.event_name)
}

/// Rules as used by the daily summary: counts only, capped at the daily
/// row limit instead of the per-poll cap.
fn summary_rules(ctx: &RunContext) -> Vec<ErrorRule> {
    ctx.config
        .errors
        .rules
        .iter()
        .map(|rule| rule.clone().with_cap(ctx.config.daily.error_row_limit))
        .collect()
}

fn plan(ctx: &RunContext, window: TimeWindow, rules: &[ErrorRule]) -> FetchPlan {
    let daily = &ctx.config.daily;
    let previous = window.previous();
    // Explicit limits so a full result can be flagged as capped.
    let rows = |event: &str, window: TimeWindow| {
        RowQuery::new(event, window).with_limit(ctx.config.posthog.max_rows)
    };
    let mut plan = FetchPlan::new();

    plan.add(ACTIVE_CURRENT, rows(&daily.active_users_event, window))
        .add(ACTIVE_PREVIOUS, rows(&daily.active_users_event, previous));

    for metric in &daily.completions {
        plan.add(completion_key(metric, "current"), rows(&metric.event, window))
            .add(completion_key(metric, "previous"), rows(&metric.event, previous));
        for funnel in &metric.funnels {
            plan.add(funnel_start_key(metric, &funnel.key), rows(&funnel.start_event, window));
        }
    }

    for (index, rule) in rules.iter().enumerate() {
        plan.add(
            error_key(index, rule),
            RowQuery::new(&rule.event_name, window)
                .with_predicate(rule.predicate.clone())
                .with_limit(rule.max_per_window),
        );
    }
    plan
}

fn compare(
    results: &FetchResults,
    current: &str,
    previous: &str,
    measure: fn(&[EventRecord]) -> PerPlatform<u64>,
    show_total_change: bool,
) -> Result<PlatformComparison, FetchFailure> {
    let now = measure(results.get(current).map_err(|f| f.clone())?);
    let before = measure(results.get(previous).map_err(|f| f.clone())?);

    Ok(PlatformComparison {
        platforms: now
            .iter()
            .map(|(platform, n)| {
                let prev = before.get(platform).copied().unwrap_or_default();
                (platform, ComparisonMetric::counts(*n, prev))
            })
            .collect(),
        total: ComparisonMetric::counts(now.total(), before.total()),
        show_total_change,
        capped: results.is_capped(current) || results.is_capped(previous),
    })
}

fn completion_section(metric: &CompletionMetric, results: &FetchResults) -> CountsSection {
    let current_key = completion_key(metric, "current");
    let data = compare(
        results,
        &current_key,
        &completion_key(metric, "previous"),
        event_counts,
        metric.compare_total,
    );

    let end_rows = results.get(&current_key);
    let funnels: Vec<FunnelEntry> = metric
        .funnels
        .iter()
        .map(|def| {
            let spec = FunnelSpec {
                key: def.key.clone(),
                label: def.label.clone(),
                start_event: def.start_event.clone(),
                end_event: metric.event.clone(),
            };
            let start_key = funnel_start_key(metric, &def.key);
            let data = match (results.get(&start_key), end_rows) {
                (Ok(start), Ok(end)) => Ok(FunnelCalculator::compute(&spec, start, end)),
                (Err(failure), _) | (_, Err(failure)) => Err(failure.clone()),
            };
            FunnelEntry {
                label: def.label.clone(),
                emoji: def.emoji.clone(),
                caption: def.caption.clone(),
                data,
                capped: results.is_capped(&start_key) || results.is_capped(&current_key),
            }
        })
        .collect();

    let attribution = if funnels.len() < 2 {
        None
    } else {
        attribute(metric, &data, &funnels)
    };

    CountsSection {
        title: metric.title.clone(),
        emoji: metric.emoji.clone(),
        data,
        funnels,
        attribution,
    }
}

fn attribute(
    metric: &CompletionMetric,
    data: &Result<PlatformComparison, FetchFailure>,
    funnels: &[FunnelEntry],
) -> Option<Result<AttributionSummary, FetchFailure>> {
    let total = match data {
        Ok(comparison) => comparison.total.current as u64,
        Err(failure) => return Some(Err(failure.clone())),
    };
    let mut results = Vec::with_capacity(funnels.len());
    for entry in funnels {
        match &entry.data {
            Ok(result) => results.push(result),
            Err(failure) => return Some(Err(failure.clone())),
        }
    }

    match AttributionReconciler::reconcile(total, &results) {
        Ok(summary) => Some(Ok(summary)),
        Err(e) => {
            warn!(metric = %metric.key, error = %e, "Attribution skipped");
            None
        }
    }
}

/// Assemble the daily report for the day before `today`.
pub async fn build(ctx: &RunContext, today: NaiveDate) -> Report {
    let window = TimeWindow::daily(today);
    let day = window.day();
    let rules = summary_rules(ctx);

    let results = ctx.fetcher().run(plan(ctx, window, &rules)).await;
    if !results.failed_keys().is_empty() {
        warn!(failed = ?results.failed_keys(), "Daily report has unavailable sections");
    }

    let mut report = Report::new(format!("📊 Daily Mobile Stats — {}", day.format("%A, %B %d, %Y")))
        .with_fallback(format!("Daily Mobile Stats — {day}"));

    report.push(ReportSection::Counts(CountsSection {
        title: "Daily Active Users".to_string(),
        emoji: "👥".to_string(),
        data: compare(&results, ACTIVE_CURRENT, ACTIVE_PREVIOUS, unique_actors, false),
        funnels: Vec::new(),
        attribution: None,
    }));

    for metric in &ctx.config.daily.completions {
        report.push(ReportSection::Counts(completion_section(metric, &results)));
    }

    let keys: Vec<String> = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| error_key(index, rule))
        .collect();
    let inputs = rules
        .iter()
        .zip(&keys)
        .map(|(rule, key)| RuleRows {
            rule,
            outcome: results.get(key),
        })
        .collect();
    let engine = ErrorRuleEngine::new(ctx.linker.clone(), ctx.config.errors.truncate_at);
    let errors = engine.evaluate(window, inputs);
    info!(
        day = %day,
        errors = errors.total,
        degraded = errors.degraded_count(),
        "Daily error summary computed"
    );

    report.push(ReportSection::Errors(ErrorsSection {
        title: "⚠️ Yesterday's Issues".to_string(),
        style: ErrorStyle::Summary,
        sections: errors.sections,
        clean_message: "✅ No errors yesterday!".to_string(),
    }));
    report.push(ReportSection::Links {
        links: ctx.links(&ctx.config.daily.links),
    });
    report
}

pub async fn run(ctx: &RunContext, today: NaiveDate) -> RunOutcome {
    let report = build(ctx, today).await;
    let message = ReportAssembler::assemble(&report);
    ctx.deliver(&message).await
}
