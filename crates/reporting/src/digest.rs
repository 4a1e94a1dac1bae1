//! Dashboard digest: a headline number for each saved insight.

use crate::format::format_number;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DigestValue {
    Metric(String),
    NotAvailable,
    FetchFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestEntry {
    pub name: String,
    pub value: DigestValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardDigest {
    pub label: String,
    pub url: String,
    /// `Err` carries the reason the dashboard itself could not be read.
    pub entries: Result<Vec<DigestEntry>, String>,
}

/// Pick the headline for an insight payload: conversion for funnels, the
/// latest data point otherwise.
pub fn extract_metric(insight: &Value) -> DigestValue {
    let extracted = if is_funnel(insight) {
        funnel_conversion(insight)
    } else {
        latest_trend_value(insight)
    };
    extracted.map_or(DigestValue::NotAvailable, DigestValue::Metric)
}

fn is_funnel(insight: &Value) -> bool {
    let legacy = insight
        .pointer("/filters/insight")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.eq_ignore_ascii_case("FUNNELS"));
    let query = insight
        .pointer("/query/source/kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind == "FunnelsQuery");
    legacy || query
}

fn funnel_conversion(insight: &Value) -> Option<String> {
    let results = insight.get("result")?.as_array()?;
    // Breakdown funnels nest one step list per series.
    let steps = match results.first()? {
        Value::Array(series) => series,
        _ => results,
    };
    if steps.len() < 2 {
        return None;
    }
    let first = step_count(steps.first()?)?;
    let last = step_count(steps.last()?)?;
    if first <= 0.0 {
        return None;
    }
    Some(format!("{:.1}%", last / first * 100.0))
}

fn step_count(step: &Value) -> Option<f64> {
    step.get("count")?.as_f64()
}

fn latest_trend_value(insight: &Value) -> Option<String> {
    let latest = insight
        .get("result")?
        .as_array()?
        .first()?
        .get("data")?
        .as_array()?
        .last()?
        .as_f64()?;
    if latest < 0.0 {
        return Some(format!("{latest:.0}"));
    }
    Some(format_number(latest.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_funnel_conversion_from_first_and_last_step() {
        let insight = json!({
            "filters": {"insight": "FUNNELS"},
            "result": [{"count": 200}, {"count": 120}, {"count": 50}]
        });
        assert_eq!(extract_metric(&insight), DigestValue::Metric("25.0%".to_string()));
    }

    #[test]
    fn test_funnel_with_series_and_query_kind() {
        let insight = json!({
            "query": {"source": {"kind": "FunnelsQuery"}},
            "result": [[{"count": 8}, {"count": 7}]]
        });
        assert_eq!(extract_metric(&insight), DigestValue::Metric("87.5%".to_string()));
    }

    #[test]
    fn test_funnel_without_entries_is_not_available() {
        let insight = json!({
            "filters": {"insight": "FUNNELS"},
            "result": [{"count": 0}, {"count": 0}]
        });
        assert_eq!(extract_metric(&insight), DigestValue::NotAvailable);

        let single = json!({"filters": {"insight": "FUNNELS"}, "result": [{"count": 4}]});
        assert_eq!(extract_metric(&single), DigestValue::NotAvailable);
    }

    #[test]
    fn test_trend_takes_latest_point() {
        let insight = json!({
            "filters": {"insight": "TRENDS"},
            "result": [{"data": [10, 20, 12345.4]}]
        });
        assert_eq!(extract_metric(&insight), DigestValue::Metric("12,345".to_string()));
    }

    #[test]
    fn test_missing_results_are_not_available() {
        assert_eq!(extract_metric(&json!({})), DigestValue::NotAvailable);
        assert_eq!(
            extract_metric(&json!({"result": [{"data": []}]})),
            DigestValue::NotAvailable
        );
    }
}
