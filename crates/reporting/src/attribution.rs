//! Path attribution: splits completions between the funnels leading to them.

use crate::funnel::FunnelResult;
use pulse_core::{PulseError, PulseResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathCount {
    pub key: String,
    pub label: String,
    pub completed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributionSummary {
    pub total_completions: u64,
    pub paths: Vec<PathCount>,
    /// Completions not explained by any funnel, floored at zero.
    pub other: u64,
}

pub struct AttributionReconciler;

impl AttributionReconciler {
    /// `other = max(0, total − Σ funnel.completed)`.
    ///
    /// One actor can complete through more than one funnel, so the funnel
    /// counts may overlap and their sum may exceed `total_completions`. The
    /// result is then floored at zero rather than deduplicated; treat it as
    /// an approximation.
    pub fn reconcile(
        total_completions: u64,
        funnels: &[&FunnelResult],
    ) -> PulseResult<AttributionSummary> {
        if let Some(first) = funnels.first() {
            if let Some(stray) = funnels.iter().find(|f| f.end_event != first.end_event) {
                return Err(PulseError::Config(format!(
                    "funnel '{}' ends at '{}' but '{}' ends at '{}'",
                    stray.key, stray.end_event, first.key, first.end_event
                )));
            }
        }

        let paths: Vec<PathCount> = funnels
            .iter()
            .map(|f| PathCount {
                key: f.key.clone(),
                label: f.label.clone(),
                completed: f.completed(),
            })
            .collect();
        let attributed: u64 = paths.iter().map(|p| p.completed).sum();

        Ok(AttributionSummary {
            total_completions,
            paths,
            other: total_completions.saturating_sub(attributed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::FunnelCounts;
    use pulse_core::PerPlatform;

    fn funnel(key: &str, end_event: &str, ios: u64, android: u64) -> FunnelResult {
        FunnelResult {
            key: key.to_string(),
            label: key.to_string(),
            end_event: end_event.to_string(),
            platforms: PerPlatform::new(
                FunnelCounts::new(ios, ios),
                FunnelCounts::new(android, android),
            ),
        }
    }

    #[test]
    fn test_other_is_remainder_when_total_covers_funnels() {
        let standard = funnel("standard", "buy", 3, 2);
        let deeplink = funnel("deeplink", "buy", 1, 1);
        let summary = AttributionReconciler::reconcile(10, &[&standard, &deeplink]).unwrap();
        assert_eq!(summary.other, 3);
        assert_eq!(summary.paths[0].completed, 5);
        assert_eq!(summary.paths[1].completed, 2);
    }

    #[test]
    fn test_other_never_negative_when_funnels_overlap() {
        let standard = funnel("standard", "buy", 4, 2);
        let deeplink = funnel("deeplink", "buy", 3, 0);
        let summary = AttributionReconciler::reconcile(7, &[&standard, &deeplink]).unwrap();
        assert_eq!(summary.other, 0);
        assert_eq!(summary.total_completions, 7);
    }

    #[test]
    fn test_exact_cover_leaves_nothing_over() {
        let standard = funnel("standard", "buy", 2, 0);
        let deeplink = funnel("deeplink", "buy", 0, 1);
        let summary = AttributionReconciler::reconcile(3, &[&standard, &deeplink]).unwrap();
        assert_eq!(summary.other, 0);
    }

    #[test]
    fn test_rejects_funnels_with_different_end_events() {
        let buy = funnel("standard", "buy", 1, 1);
        let onboarding = funnel("login", "session_ready", 1, 1);
        assert!(AttributionReconciler::reconcile(5, &[&buy, &onboarding]).is_err());
    }
}
