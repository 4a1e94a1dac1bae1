//! In-memory collaborators for dry pipelines and tests.

use crate::slack::ChatSink;
use async_trait::async_trait;
use pulse_core::{
    Dashboard, DashboardSource, EventRecord, FetchFailure, RowQuery, RowSource, SinkFailure,
};
use pulse_reporting::RenderedMessage;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Serves rows from a fixed list, applying the same filtering the backend
/// query does: event, window, recognized platform, predicate, newest first
/// and limit.
#[derive(Default)]
pub struct MemoryRowSource {
    rows: Vec<EventRecord>,
    failures: HashMap<String, FetchFailure>,
    dashboards: HashMap<String, Result<Dashboard, FetchFailure>>,
    insights: HashMap<i64, Result<Value, FetchFailure>>,
    calls: AtomicUsize,
}

impl MemoryRowSource {
    pub fn new(rows: Vec<EventRecord>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Every fetch of `event_name` fails with `failure`.
    pub fn with_failure(mut self, event_name: &str, failure: FetchFailure) -> Self {
        self.failures.insert(event_name.to_string(), failure);
        self
    }

    pub fn with_dashboard(mut self, dashboard: Dashboard) -> Self {
        self.dashboards.insert(dashboard.id.clone(), Ok(dashboard));
        self
    }

    pub fn with_dashboard_failure(mut self, id: &str, failure: FetchFailure) -> Self {
        self.dashboards.insert(id.to_string(), Err(failure));
        self
    }

    pub fn with_insight(mut self, id: i64, insight: Result<Value, FetchFailure>) -> Self {
        self.insights.insert(id, insight);
        self
    }

    /// Row fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn fetch(&self, query: &RowQuery) -> Result<Vec<EventRecord>, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failures.get(&query.event_name) {
            return Err(failure.clone());
        }

        let mut rows: Vec<EventRecord> = self
            .rows
            .iter()
            .filter(|r| r.event_name == query.event_name)
            .filter(|r| r.platform.is_recognized())
            .filter(|r| query.window.contains(r.timestamp))
            .filter(|r| {
                query
                    .predicate
                    .as_ref()
                    .map_or(true, |p| p.matches(&r.properties))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

#[async_trait]
impl DashboardSource for MemoryRowSource {
    async fn dashboard(&self, id: &str) -> Result<Dashboard, FetchFailure> {
        self.dashboards.get(id).cloned().unwrap_or(Err(FetchFailure::Backend {
            status: 404,
            body: "Not found.".to_string(),
        }))
    }

    async fn insight(&self, id: i64) -> Result<Value, FetchFailure> {
        self.insights.get(&id).cloned().unwrap_or(Err(FetchFailure::Backend {
            status: 404,
            body: "Not found.".to_string(),
        }))
    }
}

/// Records every posted message; optionally rejects them all.
#[derive(Default)]
pub struct CaptureSink {
    messages: Mutex<Vec<RenderedMessage>>,
    failure: Option<SinkFailure>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failure: SinkFailure) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failure: Some(failure),
        }
    }

    pub fn messages(&self) -> Vec<RenderedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatSink for CaptureSink {
    async fn post(&self, message: &RenderedMessage) -> Result<(), SinkFailure> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "capture"
    }
}
