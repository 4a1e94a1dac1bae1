//! Run pipelines: plan the fetches, compute the metrics, assemble the
//! report and deliver it.

pub mod alerts;
pub mod context;
pub mod daily;
pub mod digest;
pub mod outcome;
pub mod self_test;

pub use context::RunContext;
pub use outcome::RunOutcome;

use chrono::{DateTime, Utc};
use pulse_core::RunMode;
use tracing::info;

/// Produce and deliver the report for `mode` as of `now`.
pub async fn run(ctx: &RunContext, mode: RunMode, now: DateTime<Utc>) -> RunOutcome {
    info!(mode = mode.as_str(), "Starting run");
    let outcome = match mode {
        RunMode::Daily => daily::run(ctx, now.date_naive()).await,
        RunMode::Errors => alerts::run(ctx, now).await,
        RunMode::Digest => digest::run(ctx, now).await,
    };
    metrics::counter!("runs.completed", "mode" => mode.as_str()).increment(1);
    info!(mode = mode.as_str(), outcome = ?outcome, "Run finished");
    outcome
}
