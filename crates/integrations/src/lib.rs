//! Backend and chat integrations: PostHog queries, bounded fetch fan-out
//! and Slack delivery.

pub mod fetcher;
pub mod hogql;
pub mod memory;
pub mod posthog;
pub mod slack;

pub use fetcher::{FetchOutcome, FetchPlan, FetchResults, Fetcher};
pub use hogql::{build_row_query, HogQlQuery};
pub use memory::{CaptureSink, MemoryRowSource};
pub use posthog::PostHogClient;
pub use slack::{fit_block_limit, ChatSink, SlackWebhook, StdoutSink, MAX_BLOCKS};
