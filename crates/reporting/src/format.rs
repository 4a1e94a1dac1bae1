//! Text formatting for chat output.

use crate::comparison::{ComparisonMetric, Trend};
use crate::funnel::FunnelCounts;

pub const ELLIPSIS: &str = "...";

/// `1234567` → `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Whole values with separators, fractional values with one decimal.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value >= 0.0 && value <= u64::MAX as f64 {
        format_number(value as u64)
    } else {
        format!("{value:.1}")
    }
}

/// `📈 +50.0%`, `📉 -12.5%`, `➡️ +0.0%`, `🆕` or `—`.
pub fn format_change(metric: &ComparisonMetric) -> String {
    match (metric.trend, metric.delta_pct) {
        (Trend::New, _) => "🆕".to_string(),
        (Trend::None, _) | (_, None) => "—".to_string(),
        (trend, Some(delta)) => {
            let emoji = match trend {
                Trend::Up => "📈",
                Trend::Down => "📉",
                _ => "➡️",
            };
            format!("{emoji} {delta:+.1}%")
        }
    }
}

/// `*87.5%* (8→7)`, or `—` when nobody started.
pub fn format_funnel(counts: &FunnelCounts) -> String {
    if counts.started == 0 {
        return "—".to_string();
    }
    format!("*{}%* ({}→{})", counts.rate, counts.started, counts.completed)
}

/// Cut `text` to `max_chars` characters and mark the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Strip characters that would break Slack `mrkdwn` code spans and links.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('`', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(&ComparisonMetric::counts(15, 10)), "📈 +50.0%");
        assert_eq!(format_change(&ComparisonMetric::counts(5, 10)), "📉 -50.0%");
        assert_eq!(format_change(&ComparisonMetric::counts(10, 10)), "➡️ +0.0%");
        assert_eq!(format_change(&ComparisonMetric::counts(3, 0)), "🆕");
        assert_eq!(format_change(&ComparisonMetric::counts(0, 0)), "—");
    }

    #[test]
    fn test_format_funnel() {
        assert_eq!(format_funnel(&FunnelCounts::new(8, 7)), "*87.5%* (8→7)");
        assert_eq!(format_funnel(&FunnelCounts::new(0, 0)), "—");
        assert_eq!(format_funnel(&FunnelCounts::new(2, 2)), "*100%* (2→2)");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééééé", 2), "éé...");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn test_escape_mrkdwn() {
        assert_eq!(escape_mrkdwn("a<b>&`c`"), "a&lt;b&gt;&amp;'c'");
    }
}
