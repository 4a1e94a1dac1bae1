//! Short-window error alert with per-occurrence details and replay links.

use crate::context::RunContext;
use crate::outcome::RunOutcome;
use chrono::{DateTime, Utc};
use pulse_core::{RowQuery, TimeWindow};
use pulse_integrations::FetchPlan;
use pulse_reporting::{
    ErrorReport, ErrorRuleEngine, ErrorStyle, ErrorsSection, Report, ReportAssembler,
    ReportSection, RuleRows,
};
use tracing::info;

/// Evaluate every rule over the `poll_minutes` before `now`.
pub async fn evaluate(ctx: &RunContext, now: DateTime<Utc>) -> ErrorReport {
    let settings = &ctx.config.errors;
    let window = TimeWindow::trailing(now, settings.poll_minutes);

    let mut plan = FetchPlan::new();
    let keys: Vec<String> = settings
        .rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let key = format!("rule:{index}:{}", rule.event_name);
            plan.add(
                key.clone(),
                RowQuery::new(&rule.event_name, window)
                    .with_predicate(rule.predicate.clone())
                    .with_properties(rule.projected_properties.clone())
                    .with_limit(rule.max_per_window),
            );
            key
        })
        .collect();

    let results = ctx.fetcher().run(plan).await;
    let inputs = settings
        .rules
        .iter()
        .zip(&keys)
        .map(|(rule, key)| RuleRows {
            rule,
            outcome: results.get(key),
        })
        .collect();

    ErrorRuleEngine::new(ctx.linker.clone(), settings.truncate_at).evaluate(window, inputs)
}

/// Lay out an alert for `errors`.
pub fn report(ctx: &RunContext, errors: ErrorReport) -> Report {
    let minutes = ctx.config.errors.poll_minutes;
    let degraded = errors.degraded_count();

    let title = if errors.total > 0 {
        format!("🚨 {} errors in last {minutes} min", errors.total)
    } else if degraded > 0 {
        format!("⚠️ Error check incomplete: {degraded} rules unavailable")
    } else {
        format!("✅ No errors in last {minutes} min")
    };
    let subtitle = format!(
        "_{} - {} UTC_",
        errors.window.start.format("%H:%M"),
        errors.window.end.format("%H:%M")
    );

    let mut report = Report::new(title.clone())
        .with_subtitle(subtitle)
        .with_fallback(title);
    report.push(ReportSection::Errors(ErrorsSection {
        title: "Errors".to_string(),
        style: ErrorStyle::Details,
        sections: errors.sections,
        clean_message: format!("✅ No errors in last {minutes} min"),
    }));
    report.push(ReportSection::Links {
        links: ctx.links(&ctx.config.errors.links),
    });
    report
}

pub async fn run(ctx: &RunContext, now: DateTime<Utc>) -> RunOutcome {
    let errors = evaluate(ctx, now).await;
    info!(
        total = errors.total,
        degraded = errors.degraded_count(),
        sections = errors.sections.len(),
        "Error poll evaluated"
    );

    if errors.is_clean() && !ctx.config.errors.post_when_clean {
        return RunOutcome::Skipped {
            reason: format!("no errors in last {} min", ctx.config.errors.poll_minutes),
        };
    }

    let message = ReportAssembler::assemble(&report(ctx, errors));
    ctx.deliver(&message).await
}
