//! Bounded concurrent fetching of every query a run needs.
//!
//! Queries are deduplicated by fingerprint, run under a semaphore and stored
//! by identity, so the caller reads results by key no matter which fetch
//! finished first.

use dashmap::DashMap;
use pulse_core::{EventRecord, FetchFailure, RowQuery, RowSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub type FetchOutcome = Result<Arc<Vec<EventRecord>>, FetchFailure>;

static MISSING: FetchFailure = FetchFailure::Cancelled;

/// Named queries to run together.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    requests: Vec<(String, RowQuery)>,
}

impl FetchPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `query` under `key`. A later query with the same key
    /// replaces the earlier one.
    pub fn add(&mut self, key: impl Into<String>, query: RowQuery) -> &mut Self {
        let key = key.into();
        self.requests.retain(|(k, _)| *k != key);
        self.requests.push((key, query));
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Outcome of every planned key.
#[derive(Debug, Default)]
pub struct FetchResults {
    outcomes: HashMap<String, FetchOutcome>,
    limits: HashMap<String, usize>,
}

impl FetchResults {
    /// Rows for `key`, or why they are missing. Keys that were never planned
    /// read as cancelled.
    pub fn get(&self, key: &str) -> Result<&[EventRecord], &FetchFailure> {
        match self.outcomes.get(key) {
            Some(Ok(rows)) => Ok(rows.as_slice()),
            Some(Err(failure)) => Err(failure),
            None => Err(&MISSING),
        }
    }

    /// Whether `key` returned as many rows as its query allowed, so the
    /// rows may be a newest-first prefix of a larger result.
    pub fn is_capped(&self, key: &str) -> bool {
        match (self.outcomes.get(key), self.limits.get(key)) {
            (Some(Ok(rows)), Some(limit)) => rows.len() >= *limit,
            _ => false,
        }
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

pub struct Fetcher {
    source: Arc<dyn RowSource>,
    max_concurrency: usize,
    run_timeout: Duration,
}

impl Fetcher {
    pub fn new(source: Arc<dyn RowSource>, max_concurrency: usize, run_timeout: Duration) -> Self {
        Self {
            source,
            max_concurrency: max_concurrency.max(1),
            run_timeout,
        }
    }

    /// Run every query in `plan`. Fetches still in flight when the run
    /// timeout expires are aborted and their keys read as `Cancelled`.
    pub async fn run(&self, plan: FetchPlan) -> FetchResults {
        let started = Instant::now();

        let mut unique: HashMap<String, RowQuery> = HashMap::new();
        let mut keyed: Vec<(String, String)> = Vec::with_capacity(plan.requests.len());
        let mut limits = HashMap::new();
        for (key, query) in plan.requests {
            let fingerprint = query.fingerprint();
            if let Some(limit) = query.limit {
                limits.insert(key.clone(), limit);
            }
            unique.entry(fingerprint.clone()).or_insert(query);
            keyed.push((key, fingerprint));
        }

        let completed: Arc<DashMap<String, FetchOutcome>> = Arc::new(DashMap::new());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (fingerprint, query) in unique {
            let sem = Arc::clone(&semaphore);
            let source = Arc::clone(&self.source);
            let completed = Arc::clone(&completed);

            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let outcome = source.fetch(&query).await.map(Arc::new);
                match &outcome {
                    Ok(rows) => {
                        debug!(event = %query.event_name, rows = rows.len(), "Fetched rows")
                    }
                    Err(e) => warn!(event = %query.event_name, error = %e, "Fetch failed"),
                }
                completed.insert(fingerprint, outcome);
            });
        }

        let drained = tokio::time::timeout(self.run_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Fetch task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                timeout_secs = self.run_timeout.as_secs(),
                in_flight = tasks.len(),
                "Run timeout reached, aborting outstanding fetches"
            );
            tasks.abort_all();
        }

        let mut outcomes = HashMap::with_capacity(keyed.len());
        for (key, fingerprint) in keyed {
            let outcome = completed
                .get(&fingerprint)
                .map(|entry| entry.value().clone())
                .unwrap_or_else(|| {
                    metrics::counter!("fetch.cancelled").increment(1);
                    Err(FetchFailure::Cancelled)
                });
            outcomes.insert(key, outcome);
        }

        info!(
            queries = completed.len(),
            keys = outcomes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetch plan complete"
        );
        FetchResults { outcomes, limits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use pulse_core::{Platform, TimeWindow};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn window() -> TimeWindow {
        TimeWindow::daily(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
    }

    /// Answers each event after a delay taken from the event name
    /// (`slow_30` waits 30ms), returning one row tagged with the event.
    struct DelayedSource {
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DelayedSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RowSource for DelayedSource {
        async fn fetch(&self, query: &RowQuery) -> Result<Vec<EventRecord>, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay: u64 = query
                .event_name
                .rsplit('_')
                .next()
                .and_then(|d| d.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if query.event_name.starts_with("broken") {
                return Err(FetchFailure::Backend {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(vec![EventRecord {
                event_name: query.event_name.clone(),
                platform: Platform::Ios,
                actor_id: "a".to_string(),
                timestamp: Utc::now(),
                session_id: None,
                properties: Default::default(),
            }])
        }
    }

    #[tokio::test]
    async fn test_results_keyed_by_identity() {
        let source = Arc::new(DelayedSource::new());
        let fetcher = Fetcher::new(source.clone(), 4, Duration::from_secs(5));

        let mut plan = FetchPlan::new();
        plan.add("first", RowQuery::new("slow_60", window()))
            .add("second", RowQuery::new("fast_1", window()))
            .add("third", RowQuery::new("broken_5", window()));
        let results = fetcher.run(plan).await;

        assert_eq!(results.get("first").unwrap()[0].event_name, "slow_60");
        assert_eq!(results.get("second").unwrap()[0].event_name, "fast_1");
        assert!(matches!(
            results.get("third"),
            Err(FetchFailure::Backend { status: 500, .. })
        ));
        assert_eq!(results.failed_keys(), vec!["third"]);
        assert_eq!(results.get("never-planned"), Err(&FetchFailure::Cancelled));
    }

    #[tokio::test]
    async fn test_identical_queries_fetched_once() {
        let source = Arc::new(DelayedSource::new());
        let fetcher = Fetcher::new(source.clone(), 4, Duration::from_secs(5));

        let mut plan = FetchPlan::new();
        plan.add("dau", RowQuery::new("app_launched_1", window()))
            .add("launches", RowQuery::new("app_launched_1", window()))
            .add("limited", RowQuery::new("app_launched_1", window()).with_limit(10));
        let results = fetcher.run(plan).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 3);
        assert!(results.get("dau").is_ok());
        assert!(results.get("launches").is_ok());
    }

    #[tokio::test]
    async fn test_capped_when_rows_reach_limit() {
        let source = Arc::new(DelayedSource::new());
        let fetcher = Fetcher::new(source, 4, Duration::from_secs(5));

        let mut plan = FetchPlan::new();
        plan.add("full", RowQuery::new("launch_1", window()).with_limit(1))
            .add("room", RowQuery::new("launch_1", window()).with_limit(10))
            .add("open", RowQuery::new("launch_1", window()))
            .add("failed", RowQuery::new("broken_1", window()).with_limit(1));
        let results = fetcher.run(plan).await;

        assert!(results.is_capped("full"));
        assert!(!results.is_capped("room"));
        assert!(!results.is_capped("open"));
        assert!(!results.is_capped("failed"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let source = Arc::new(DelayedSource::new());
        let fetcher = Fetcher::new(source.clone(), 2, Duration::from_secs(5));

        let mut plan = FetchPlan::new();
        for i in 0..6 {
            plan.add(format!("q{i}"), RowQuery::new(format!("event{i}_20"), window()));
        }
        let results = fetcher.run(plan).await;

        assert_eq!(results.failed_keys().len(), 0);
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_timeout_cancels_unfinished_keys() {
        let source = Arc::new(DelayedSource::new());
        let fetcher = Fetcher::new(source, 4, Duration::from_millis(100));

        let mut plan = FetchPlan::new();
        plan.add("quick", RowQuery::new("quick_1", window()))
            .add("stuck", RowQuery::new("stuck_10000", window()));
        let results = fetcher.run(plan).await;

        assert!(results.get("quick").is_ok());
        assert_eq!(results.get("stuck"), Err(&FetchFailure::Cancelled));
    }
}
