//! Chat delivery: Slack incoming webhooks and a stdout sink for dry runs.

use async_trait::async_trait;
use pulse_core::{PulseError, PulseResult, SinkFailure};
pub use pulse_reporting::MAX_BLOCKS;
use pulse_reporting::{Block, RenderedMessage};
use std::time::Duration;
use tracing::{error, info};

const MAX_RESPONSE_BODY: usize = 300;

#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Deliver one message. Delivery is attempted once.
    async fn post(&self, message: &RenderedMessage) -> Result<(), SinkFailure>;

    fn name(&self) -> &str;
}

/// Keep `blocks` within [`MAX_BLOCKS`], replacing the tail with a note
/// saying how many were dropped.
pub fn fit_block_limit(blocks: &[Block]) -> Vec<Block> {
    if blocks.len() <= MAX_BLOCKS {
        return blocks.to_vec();
    }
    let kept = MAX_BLOCKS - 1;
    let omitted = blocks.len() - kept;
    let mut fitted = blocks[..kept].to_vec();
    fitted.push(Block::context(format!("… {omitted} more blocks omitted")));
    fitted
}

pub struct SlackWebhook {
    client: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: &str, timeout: Duration) -> PulseResult<Self> {
        url::Url::parse(url)
            .map_err(|e| PulseError::Config(format!("invalid Slack webhook URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PulseError::Internal(e.into()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ChatSink for SlackWebhook {
    async fn post(&self, message: &RenderedMessage) -> Result<(), SinkFailure> {
        let blocks = fit_block_limit(&message.blocks);
        let body = serde_json::json!({
            "text": message.text,
            "blocks": blocks,
        });

        let response = match self.client.post(&self.url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Slack webhook unreachable");
                metrics::counter!("slack.posts", "outcome" => "transport_error").increment(1);
                return Err(SinkFailure::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(MAX_RESPONSE_BODY).collect();
            error!(status = status.as_u16(), body = %body, "Slack rejected message");
            metrics::counter!("slack.posts", "outcome" => "rejected").increment(1);
            return Err(SinkFailure::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(blocks = blocks.len(), "Posted to Slack");
        metrics::counter!("slack.posts", "outcome" => "ok").increment(1);
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}

/// Prints the webhook payload instead of sending it.
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatSink for StdoutSink {
    async fn post(&self, message: &RenderedMessage) -> Result<(), SinkFailure> {
        let payload = serde_json::json!({
            "text": message.text,
            "blocks": fit_block_limit(&message.blocks),
        });
        let rendered = serde_json::to_string_pretty(&payload)
            .map_err(|e| SinkFailure::Encoding(e.to_string()))?;
        println!("{rendered}");
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}
