//! Report assembly: turns computed metric sections into chat blocks.
//!
//! Everything numeric is computed upstream; this module only lays the
//! values out, omits empty sections and marks unavailable ones.

use crate::attribution::AttributionSummary;
use crate::blocks::{Block, RenderedMessage, MAX_BLOCKS};
use crate::comparison::ComparisonMetric;
use crate::digest::{DashboardDigest, DigestValue};
use crate::error_rules::{ErrorSection, ErrorSectionStatus};
use crate::format::{escape_mrkdwn, format_change, format_funnel, format_number, format_value};
use crate::funnel::FunnelResult;
use pulse_core::{FetchFailure, Platform};

const UNAVAILABLE: &str = "⚠️ _data unavailable_";
const LIMIT_REACHED: &str = "_(limit reached)_";

// ─── Types ──────────────────────────────────────────────────────────────────

/// Section payload, or the fetch failure that left it without data.
pub type SectionData<T> = Result<T, FetchFailure>;

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformComparison {
    pub platforms: Vec<(Platform, ComparisonMetric)>,
    pub total: ComparisonMetric,
    /// Show the period-over-period change next to the total.
    pub show_total_change: bool,
    /// A fetch behind these counts hit its row limit.
    pub capped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunnelEntry {
    pub label: String,
    pub emoji: String,
    pub caption: String,
    pub data: SectionData<FunnelResult>,
    /// The start or end rows hit their row limit.
    pub capped: bool,
}

impl FunnelEntry {
    fn has_content(&self) -> bool {
        self.data.as_ref().map_or(true, |f| !f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountsSection {
    pub title: String,
    pub emoji: String,
    pub data: SectionData<PlatformComparison>,
    pub funnels: Vec<FunnelEntry>,
    pub attribution: Option<SectionData<AttributionSummary>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStyle {
    /// One line per rule with per-platform counts.
    Summary,
    /// Every match listed with its message and replay link.
    Details,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorsSection {
    pub title: String,
    pub style: ErrorStyle,
    pub sections: Vec<ErrorSection>,
    /// Shown instead of the section when nothing matched.
    pub clean_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportSection {
    Counts(CountsSection),
    Errors(ErrorsSection),
    Digest { dashboards: Vec<DashboardDigest> },
    Links { links: Vec<Link> },
    Note { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub subtitle: Option<String>,
    /// Notification preview. The title is used when empty.
    pub fallback_text: String,
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            fallback_text: String::new(),
            sections: Vec::new(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    pub fn push(&mut self, section: ReportSection) {
        self.sections.push(section);
    }
}

// ─── Assembler ──────────────────────────────────────────────────────────────

pub struct ReportAssembler;

impl ReportAssembler {
    /// Lay out `report` as blocks. Sections are separated by dividers and
    /// kept in order; the result always has at least the header.
    ///
    /// When per-match detail lines would push the message past
    /// [`MAX_BLOCKS`], each rule lists only its newest matches followed by
    /// a "+N more" note. Headers, unavailable markers and footers are
    /// always kept.
    pub fn assemble(report: &Report) -> RenderedMessage {
        let mut blocks = Self::layout(report, None);
        if blocks.len() > MAX_BLOCKS {
            let longest = report
                .sections
                .iter()
                .filter_map(|s| match s {
                    ReportSection::Errors(errors) => {
                        errors.sections.iter().map(|e| e.matches().len()).max()
                    }
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            for per_rule in (0..longest).rev() {
                blocks = Self::layout(report, Some(per_rule));
                if blocks.len() <= MAX_BLOCKS {
                    break;
                }
            }
        }

        let text = if report.fallback_text.trim().is_empty() {
            report.title.clone()
        } else {
            report.fallback_text.clone()
        };
        RenderedMessage::new(text, blocks)
    }

    fn layout(report: &Report, per_rule: Option<usize>) -> Vec<Block> {
        let mut blocks = vec![Block::header(&report.title)];
        if let Some(subtitle) = report.subtitle.as_deref().filter(|s| !s.is_empty()) {
            blocks.push(Block::context(subtitle));
        }

        for section in &report.sections {
            let rendered = render_section(section, per_rule);
            if rendered.is_empty() {
                continue;
            }
            blocks.push(Block::Divider);
            blocks.extend(rendered);
        }
        blocks
    }
}

fn render_section(section: &ReportSection, per_rule: Option<usize>) -> Vec<Block> {
    match section {
        ReportSection::Counts(counts) => render_counts(counts),
        ReportSection::Errors(errors) => render_errors(errors, per_rule),
        ReportSection::Digest { dashboards } => dashboards.iter().map(render_dashboard).collect(),
        ReportSection::Links { links } if links.is_empty() => Vec::new(),
        ReportSection::Links { links } => {
            let joined = links
                .iter()
                .map(|l| format!("<{}|{}>", l.url, l.label))
                .collect::<Vec<_>>()
                .join(" · ");
            vec![Block::context(joined)]
        }
        ReportSection::Note { text } if text.trim().is_empty() => Vec::new(),
        ReportSection::Note { text } => vec![Block::context(text.clone())],
    }
}

fn render_counts(section: &CountsSection) -> Vec<Block> {
    let heading = format!("*{} {}*", section.emoji, section.title);
    let body = match &section.data {
        Ok(comparison) => {
            let mut lines = vec![heading];
            for (platform, metric) in &comparison.platforms {
                lines.push(format!(
                    "• {}: *{}* {}",
                    platform,
                    format_value(metric.current),
                    format_change(metric)
                ));
            }
            let mut total = format!("• Total: *{}*", format_value(comparison.total.current));
            if comparison.show_total_change {
                total.push(' ');
                total.push_str(&format_change(&comparison.total));
            }
            if comparison.capped {
                total.push(' ');
                total.push_str(LIMIT_REACHED);
            }
            lines.push(total);
            lines.join("\n")
        }
        Err(_) => format!("{heading}\n{UNAVAILABLE}"),
    };

    let mut blocks = vec![Block::section(body)];
    if section.funnels.iter().any(FunnelEntry::has_content) {
        blocks.push(Block::context(render_funnels(section)));
    }
    blocks
}

fn render_funnels(section: &CountsSection) -> String {
    let mut parts: Vec<String> = section
        .funnels
        .iter()
        .map(|entry| {
            let mut heading = if entry.emoji.is_empty() {
                format!("*{}*", entry.label)
            } else {
                format!("*{} {}*", entry.emoji, entry.label)
            };
            if !entry.caption.is_empty() {
                heading = format!("{heading} ({})", entry.caption);
            }
            if entry.capped {
                heading = format!("{heading} {LIMIT_REACHED}");
            }
            let body = match &entry.data {
                Ok(funnel) => funnel
                    .platforms
                    .iter()
                    .map(|(platform, counts)| format!("{}: {}", platform, format_funnel(counts)))
                    .collect::<Vec<_>>()
                    .join(" · "),
                Err(_) => UNAVAILABLE.to_string(),
            };
            format!("{heading}\n{body}")
        })
        .collect();

    match &section.attribution {
        Some(Ok(summary)) => {
            let mut items: Vec<String> = summary
                .paths
                .iter()
                .map(|p| format!("{}: {}", short_label(&p.label), format_number(p.completed)))
                .collect();
            items.push(format!("Other: {}", format_number(summary.other)));
            let mut line = format!("_{}_", items.join(" · "));
            let capped = section.data.as_ref().is_ok_and(|c| c.capped)
                || section.funnels.iter().any(|f| f.capped);
            if capped {
                line = format!("{line} {LIMIT_REACHED}");
            }
            parts.push(line);
        }
        Some(Err(_)) => parts.push(format!("_Attribution:_ {UNAVAILABLE}")),
        None => {}
    }
    parts.join("\n\n")
}

/// `Standard Flow` → `Standard`.
fn short_label(label: &str) -> &str {
    label.strip_suffix(" Flow").unwrap_or(label)
}

fn render_errors(section: &ErrorsSection, per_rule: Option<usize>) -> Vec<Block> {
    let has_content = section
        .sections
        .iter()
        .any(|s| s.is_degraded() || !s.matches().is_empty());
    if !has_content {
        return vec![Block::section(format!("*{}*", section.clean_message))];
    }

    match section.style {
        ErrorStyle::Summary => {
            let mut lines = vec![format!("*{}*", section.title)];
            let visible = section
                .sections
                .iter()
                .filter(|s| s.is_degraded() || !s.matches().is_empty());
            for s in visible {
                lines.push(summary_line(s));
            }
            vec![Block::section(lines.join("\n"))]
        }
        ErrorStyle::Details => {
            let mut blocks = Vec::new();
            let visible = section
                .sections
                .iter()
                .filter(|s| s.is_degraded() || !s.matches().is_empty());
            for (i, s) in visible.enumerate() {
                if i > 0 {
                    blocks.push(Block::Divider);
                }
                blocks.extend(detail_blocks(s, per_rule));
            }
            blocks
        }
    }
}

fn summary_line(section: &ErrorSection) -> String {
    let title = section.rule.title();
    match &section.status {
        ErrorSectionStatus::Degraded { .. } => format!("• {title}: {UNAVAILABLE}"),
        ErrorSectionStatus::Matched { capped, .. } => {
            let counts = section
                .platform_counts()
                .into_iter()
                .map(|(platform, n)| format!("{} *{}*", platform, format_number(n)))
                .collect::<Vec<_>>()
                .join(" · ");
            let mut line = format!("• {title}: {counts}");
            if *capped {
                line.push(' ');
                line.push_str(LIMIT_REACHED);
            }
            line
        }
    }
}

fn detail_blocks(section: &ErrorSection, per_rule: Option<usize>) -> Vec<Block> {
    let title = section.rule.title();
    match &section.status {
        ErrorSectionStatus::Degraded { .. } => {
            vec![Block::section(format!("*{title}*: {UNAVAILABLE}"))]
        }
        ErrorSectionStatus::Matched { matches, capped } => {
            let mut header = format!("*{title}* ({})", format_number(matches.len() as u64));
            if *capped {
                header.push_str(" _limit reached_");
            }
            let shown = per_rule.map_or(matches.len(), |n| n.min(matches.len()));
            let mut blocks = vec![Block::section(header)];
            for m in &matches[..shown] {
                let mut line = format!("{} `{}`", m.platform.emoji(), escape_mrkdwn(&m.message));
                if let Some(url) = &m.replay_url {
                    line.push_str(&format!("\n     <{url}|▶️ Watch Session>"));
                }
                blocks.push(Block::context(line));
            }
            if shown < matches.len() {
                let hidden = (matches.len() - shown) as u64;
                blocks.push(Block::context(format!("_+{} more_", format_number(hidden))));
            }
            blocks
        }
    }
}

fn render_dashboard(digest: &DashboardDigest) -> Block {
    let heading = format!("*<{}|{}>*", digest.url, digest.label);
    let lines = match &digest.entries {
        Err(reason) => vec![format!("• _Error: {}_", escape_mrkdwn(reason))],
        Ok(entries) if entries.is_empty() => vec!["• _No insights found_".to_string()],
        Ok(entries) => entries
            .iter()
            .map(|e| match &e.value {
                DigestValue::Metric(value) => format!("• {}: *{}*", e.name, value),
                DigestValue::NotAvailable => format!("• {}: *N/A*", e.name),
                DigestValue::FetchFailed => format!("• {}: _error fetching_", e.name),
            })
            .collect(),
    };
    Block::section(format!("{heading}\n{}", lines.join("\n")))
}
