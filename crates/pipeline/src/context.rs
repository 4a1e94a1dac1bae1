use crate::outcome::RunOutcome;
use pulse_core::{AppConfig, Credentials, DashboardSource, LinkDefinition, RowSource};
use pulse_integrations::{ChatSink, Fetcher};
use pulse_reporting::{Link, RenderedMessage, ReplayLinker};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Everything a run needs, built once by the binary and passed down.
pub struct RunContext {
    pub config: AppConfig,
    pub linker: ReplayLinker,
    pub rows: Arc<dyn RowSource>,
    pub dashboards: Arc<dyn DashboardSource>,
    pub sink: Arc<dyn ChatSink>,
}

impl RunContext {
    pub fn new(
        config: AppConfig,
        credentials: &Credentials,
        rows: Arc<dyn RowSource>,
        dashboards: Arc<dyn DashboardSource>,
        sink: Arc<dyn ChatSink>,
    ) -> Self {
        Self {
            linker: ReplayLinker::new(&credentials.host, &credentials.project_id),
            config,
            rows,
            dashboards,
            sink,
        }
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            Arc::clone(&self.rows),
            self.config.posthog.max_concurrency,
            Duration::from_secs(self.config.posthog.run_timeout_secs),
        )
    }

    pub fn links(&self, definitions: &[LinkDefinition]) -> Vec<Link> {
        definitions
            .iter()
            .map(|d| Link {
                label: d.label.clone(),
                url: self.linker.project_url(&d.path),
            })
            .collect()
    }

    /// Post `message` once. A failure is logged and returned, never retried.
    pub async fn deliver(&self, message: &RenderedMessage) -> RunOutcome {
        match self.sink.post(message).await {
            Ok(()) => {
                info!(sink = self.sink.name(), blocks = message.blocks.len(), "Report delivered");
                RunOutcome::Posted {
                    blocks: message.blocks.len(),
                }
            }
            Err(failure) => {
                error!(sink = self.sink.name(), error = %failure, "Report delivery failed");
                RunOutcome::DeliveryFailed { failure }
            }
        }
    }
}
