//! Per-platform event counts and unique actors.

use pulse_core::{EventRecord, PerPlatform};
use std::collections::HashSet;

/// Rows per recognized platform.
pub fn event_counts(rows: &[EventRecord]) -> PerPlatform<u64> {
    let mut counts = PerPlatform::<u64>::default();
    for record in rows {
        if let Some(count) = counts.get_mut(record.platform) {
            *count += 1;
        }
    }
    counts
}

/// Distinct actors per recognized platform. An actor seen on both
/// platforms counts once on each.
pub fn unique_actors(rows: &[EventRecord]) -> PerPlatform<u64> {
    let mut seen: PerPlatform<HashSet<&str>> = PerPlatform::default();
    for record in rows {
        if let Some(actors) = seen.get_mut(record.platform) {
            actors.insert(record.actor_id.as_str());
        }
    }
    seen.map(|_, actors| actors.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::Platform;

    fn row(actor: &str, platform: Platform) -> EventRecord {
        EventRecord {
            event_name: "app_launched".to_string(),
            platform,
            actor_id: actor.to_string(),
            timestamp: Utc::now(),
            session_id: None,
            properties: Default::default(),
        }
    }

    #[test]
    fn test_counts_and_unique_actors() {
        let rows = vec![
            row("a", Platform::Ios),
            row("a", Platform::Ios),
            row("b", Platform::Ios),
            row("c", Platform::Android),
            row("a", Platform::Android),
            row("z", Platform::Unknown),
        ];

        let counts = event_counts(&rows);
        assert_eq!(counts, PerPlatform::new(3, 2));

        let actors = unique_actors(&rows);
        assert_eq!(actors, PerPlatform::new(2, 2));
        assert_eq!(actors.total(), 4);
    }

    #[test]
    fn test_empty_rows_are_zero() {
        assert_eq!(event_counts(&[]), PerPlatform::new(0, 0));
        assert_eq!(unique_actors(&[]), PerPlatform::new(0, 0));
    }
}
