//! Funnel analysis: start → end conversion per platform from raw event rows.

use chrono::{DateTime, Utc};
use pulse_core::{EventRecord, PerPlatform, Platform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelSpec {
    pub key: String,
    pub label: String,
    pub start_event: String,
    pub end_event: String,
}

/// Conversion for one platform. `rate` is a percentage rounded to one
/// decimal and is not clamped to 100.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct FunnelCounts {
    pub started: u64,
    pub completed: u64,
    pub rate: f64,
}

impl FunnelCounts {
    pub fn new(started: u64, completed: u64) -> Self {
        let rate = if started > 0 {
            round_one_decimal(completed as f64 / started as f64 * 100.0)
        } else {
            0.0
        };
        Self {
            started,
            completed,
            rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelResult {
    pub key: String,
    pub label: String,
    pub end_event: String,
    pub platforms: PerPlatform<FunnelCounts>,
}

impl FunnelResult {
    /// Completions summed over platforms.
    pub fn completed(&self) -> u64 {
        self.platforms.ios.completed + self.platforms.android.completed
    }

    pub fn total(&self) -> FunnelCounts {
        FunnelCounts::new(
            self.platforms.ios.started + self.platforms.android.started,
            self.completed(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.ios.started == 0 && self.platforms.android.started == 0
    }
}

#[derive(Default)]
struct ActorProgress {
    first_seen: Option<(DateTime<Utc>, Platform)>,
    started: bool,
    completed: bool,
}

impl ActorProgress {
    fn observe(&mut self, record: &EventRecord) {
        // Strictly earlier only, so ties keep the first-seen record.
        let earlier = match self.first_seen {
            Some((seen, _)) => record.timestamp < seen,
            None => true,
        };
        if earlier {
            self.first_seen = Some((record.timestamp, record.platform));
        }
    }
}

pub struct FunnelCalculator;

impl FunnelCalculator {
    /// Count starters and completers per platform.
    ///
    /// Each actor is attributed to the platform of their earliest row across
    /// both events. A starter counts as completed when they have any end-event
    /// row in the window, before or after their start. Actors who only
    /// completed are not counted. Rows from unrecognized platforms are ignored.
    pub fn compute(
        spec: &FunnelSpec,
        start_rows: &[EventRecord],
        end_rows: &[EventRecord],
    ) -> FunnelResult {
        let mut actors: HashMap<&str, ActorProgress> = HashMap::new();
        // Insertion order of actors doesn't matter; per-actor tie-breaks follow
        // row order, start rows first.
        for record in start_rows.iter().filter(|r| r.platform.is_recognized()) {
            let progress = actors.entry(record.actor_id.as_str()).or_default();
            progress.observe(record);
            progress.started = true;
        }
        for record in end_rows.iter().filter(|r| r.platform.is_recognized()) {
            let progress = actors.entry(record.actor_id.as_str()).or_default();
            progress.observe(record);
            progress.completed = true;
        }

        let mut tallies: PerPlatform<(u64, u64)> = PerPlatform::default();
        for progress in actors.values().filter(|p| p.started) {
            let Some((_, platform)) = progress.first_seen else {
                continue;
            };
            if let Some(tally) = tallies.get_mut(platform) {
                tally.0 += 1;
                if progress.completed {
                    tally.1 += 1;
                }
            }
        }

        let result = FunnelResult {
            key: spec.key.clone(),
            label: spec.label.clone(),
            end_event: spec.end_event.clone(),
            platforms: tallies
                .map(|_, (started, completed)| FunnelCounts::new(*started, *completed)),
        };

        debug!(
            funnel = %spec.key,
            actors = actors.len(),
            ios_started = result.platforms.ios.started,
            android_started = result.platforms.android.started,
            "Funnel computed"
        );
        result
    }
}

pub(crate) fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
