//! Collaborator seams for reading from the analytics backend.
//!
//! The engine never talks to the backend itself; pipelines hold an
//! `Arc<dyn RowSource>` and hand the fetched rows to the pure calculators.

use crate::error::FetchFailure;
use crate::predicate::Predicate;
use crate::types::{EventRecord, TimeWindow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request for the rows of one event inside a window. Only rows from
/// recognized platforms are returned, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowQuery {
    pub event_name: String,
    pub window: TimeWindow,
    pub predicate: Option<Predicate>,
    pub projected_properties: Vec<String>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn new(event_name: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            event_name: event_name.into(),
            window,
            predicate: None,
            projected_properties: Vec::new(),
            limit: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.projected_properties = properties;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Stable identity used to fetch identical queries once.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{}|{}|{}|{:?}",
                self.event_name,
                self.window.from_text(),
                self.window.to_text(),
                self.limit
            )
        })
    }
}

#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, query: &RowQuery) -> Result<Vec<EventRecord>, FetchFailure>;
}

/// A saved dashboard and the insights pinned to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub id: String,
    pub name: String,
    pub insights: Vec<InsightRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightRef {
    pub id: i64,
    pub name: String,
}

#[async_trait]
pub trait DashboardSource: Send + Sync {
    async fn dashboard(&self, id: &str) -> Result<Dashboard, FetchFailure>;

    /// Raw insight payload including its computed `result`.
    async fn insight(&self, id: i64) -> Result<serde_json::Value, FetchFailure>;
}
