//! Period-over-period comparison of a single metric.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
    /// Nothing in the previous period, something now.
    New,
    /// Nothing in either period.
    None,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComparisonMetric {
    pub current: f64,
    pub previous: f64,
    pub delta_pct: Option<f64>,
    pub trend: Trend,
}

impl ComparisonMetric {
    pub fn compare(current: f64, previous: f64) -> Self {
        let (delta_pct, trend) = if previous == 0.0 {
            let trend = if current > 0.0 { Trend::New } else { Trend::None };
            (None, trend)
        } else {
            let delta = (current - previous) / previous * 100.0;
            let trend = if delta > 0.0 {
                Trend::Up
            } else if delta < 0.0 {
                Trend::Down
            } else {
                Trend::Flat
            };
            (Some(delta), trend)
        };

        Self {
            current,
            previous,
            delta_pct,
            trend,
        }
    }

    pub fn counts(current: u64, previous: u64) -> Self {
        Self::compare(current as f64, previous as f64)
    }
}
