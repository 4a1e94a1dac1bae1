//! Shared types for the Pulse reporting engine: configuration, errors,
//! event rows, rule tables and the backend collaborator traits.

pub mod config;
pub mod error;
pub mod predicate;
pub mod rules;
pub mod source;
pub mod types;

pub use config::{AppConfig, Credentials, RunMode};
pub use error::{FetchFailure, PulseError, PulseResult, SinkFailure};
pub use predicate::{ComparisonOperator, Predicate, PropertyCondition};
pub use rules::{
    CompletionMetric, DashboardDefinition, ErrorRule, FunnelDefinition, LinkDefinition,
};
pub use source::{Dashboard, DashboardSource, InsightRef, RowQuery, RowSource};
pub use types::{EventRecord, Granularity, PerPlatform, Platform, Properties, TimeWindow};
