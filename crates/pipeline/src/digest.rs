//! Dashboard digest: the headline number of each pinned insight.

use crate::context::RunContext;
use crate::outcome::RunOutcome;
use chrono::{DateTime, Utc};
use pulse_core::DashboardDefinition;
use pulse_reporting::{
    extract_metric, DashboardDigest, DigestEntry, DigestValue, Report, ReportAssembler,
    ReportSection,
};
use tracing::{debug, warn};

async fn summarize(ctx: &RunContext, definition: &DashboardDefinition) -> DashboardDigest {
    let url = ctx.linker.project_url(&format!("dashboard/{}", definition.id));
    let dashboard = match ctx.dashboards.dashboard(&definition.id).await {
        Ok(dashboard) => dashboard,
        Err(failure) => {
            warn!(dashboard = %definition.id, error = %failure, "Dashboard fetch failed");
            return DashboardDigest {
                label: definition.label.clone(),
                url,
                entries: Err(failure.to_string()),
            };
        }
    };

    let mut entries = Vec::new();
    for insight in dashboard
        .insights
        .iter()
        .take(ctx.config.digest.tiles_per_dashboard)
    {
        let value = match ctx.dashboards.insight(insight.id).await {
            Ok(payload) => extract_metric(&payload),
            Err(failure) => {
                warn!(insight = insight.id, error = %failure, "Insight fetch failed");
                DigestValue::FetchFailed
            }
        };
        debug!(insight = insight.id, value = ?value, "Insight summarized");
        entries.push(DigestEntry {
            name: insight.name.clone(),
            value,
        });
    }

    DashboardDigest {
        label: definition.label.clone(),
        url,
        entries: Ok(entries),
    }
}

pub async fn build(ctx: &RunContext, now: DateTime<Utc>) -> Report {
    let mut dashboards = Vec::with_capacity(ctx.config.digest.dashboards.len());
    for definition in &ctx.config.digest.dashboards {
        dashboards.push(summarize(ctx, definition).await);
    }

    let mut report = Report::new(format!("📊 Daily PostHog Digest — {}", now.format("%A, %B %d")))
        .with_fallback("Daily PostHog Digest");
    report.push(ReportSection::Digest { dashboards });
    report.push(ReportSection::Note {
        text: format!(
            "Automated daily digest from PostHog • <{}|Open PostHog>",
            ctx.linker.project_root()
        ),
    });
    report
}

pub async fn run(ctx: &RunContext, now: DateTime<Utc>) -> RunOutcome {
    let report = build(ctx, now).await;
    let message = ReportAssembler::assemble(&report);
    ctx.deliver(&message).await
}
