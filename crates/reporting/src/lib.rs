//! Metric computation and report layout: funnels, attribution,
//! period-over-period deltas, error rules and chat block assembly.

pub mod aggregates;
pub mod attribution;
pub mod blocks;
pub mod comparison;
pub mod digest;
pub mod error_rules;
pub mod format;
pub mod funnel;
pub mod report_builder;

pub use attribution::{AttributionReconciler, AttributionSummary, PathCount};
pub use blocks::{Block, RenderedMessage, TextObject, MAX_BLOCKS};
pub use comparison::{ComparisonMetric, Trend};
pub use digest::{extract_metric, DashboardDigest, DigestEntry, DigestValue};
pub use error_rules::{
    ErrorMatch, ErrorReport, ErrorRuleEngine, ErrorSection, ErrorSectionStatus, ReplayLinker,
    RuleRows,
};
pub use funnel::{FunnelCalculator, FunnelCounts, FunnelResult, FunnelSpec};
pub use report_builder::{
    CountsSection, ErrorStyle, ErrorsSection, FunnelEntry, Link, PlatformComparison, Report,
    ReportAssembler, ReportSection,
};
