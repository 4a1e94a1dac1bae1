//! Canned connectivity messages, one per mode. No backend access.

use crate::context::RunContext;
use crate::outcome::RunOutcome;
use pulse_core::RunMode;
use pulse_reporting::{Block, RenderedMessage};

const DAILY_SUMMARY: &str = concat!(
    "✅ *Daily reporter connected!*\n\n",
    "You'll receive:\n",
    "• 👥 DAU (iOS/Android)\n",
    "• 💰 Buy completions + funnel breakdown\n",
    "  → Standard flow conversion\n",
    "  → Deeplink flow conversion\n",
    "• 🚀 Onboarding completions + conversion\n",
    "• ⚠️ Error summary\n\n",
    "Every morning at 9am CET."
);

pub fn message(ctx: &RunContext, mode: RunMode) -> RenderedMessage {
    match mode {
        RunMode::Daily => RenderedMessage::new(
            "Test from daily reporter",
            vec![Block::section(DAILY_SUMMARY)],
        ),
        RunMode::Errors => {
            let replay = ctx.linker.replay_url("sample-session-id");
            let poll = ctx.config.errors.poll_minutes;
            RenderedMessage::new(
                "Test from error reporter",
                vec![
                    Block::section("✅ *Error reporter connected!*"),
                    Block::Divider,
                    Block::section("*Example error format:*"),
                    Block::section("*💥 Exception* (3 total)"),
                    Block::context(format!(
                        "🍎 `TypeError: Cannot read property 'x' of undefined`\n     <{replay}|▶️ Watch Session>"
                    )),
                    Block::context(format!(
                        "🤖 `NetworkError: Request failed with status 500`\n     <{replay}|▶️ Watch Session>"
                    )),
                    Block::Divider,
                    Block::context(format!(
                        "You'll receive alerts every {poll} mins (only if errors exist)."
                    )),
                ],
            )
        }
        RunMode::Digest => {
            let names: Vec<String> = ctx
                .config
                .digest
                .dashboards
                .iter()
                .map(|d| format!("• {}", d.label))
                .collect();
            RenderedMessage::new(
                "Test from PostHog digest",
                vec![
                    Block::section("✅ *PostHog digest connected!*"),
                    Block::context(format!(
                        "Dashboards in the daily digest:\n{}",
                        names.join("\n")
                    )),
                ],
            )
        }
    }
}

pub async fn run(ctx: &RunContext, mode: RunMode) -> RunOutcome {
    ctx.deliver(&message(ctx, mode)).await
}
