//! PostHog client: HogQL row queries, dashboards and insights.

use crate::hogql::{build_row_query, FIXED_COLUMNS};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use pulse_core::config::PostHogConfig;
use pulse_core::{
    Credentials, Dashboard, DashboardSource, EventRecord, FetchFailure, InsightRef, Platform,
    Properties, PulseError, PulseResult, RowQuery, RowSource,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest backend error body kept in a `FetchFailure`.
const MAX_ERROR_BODY: usize = 500;

pub struct PostHogClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    project_id: String,
    max_rows: usize,
}

impl PostHogClient {
    pub fn new(credentials: &Credentials, config: &PostHogConfig) -> PulseResult<Self> {
        url::Url::parse(&credentials.host).map_err(|e| {
            PulseError::Config(format!("invalid PostHog host '{}': {e}", credentials.host))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PulseError::Internal(e.into()))?;

        Ok(Self {
            client,
            host: credentials.host.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            project_id: credentials.project_id.clone(),
            max_rows: config.max_rows,
        })
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/api/projects/{}/{}", self.host, self.project_id, path)
    }

    async fn read_json(&self, request: reqwest::RequestBuilder) -> Result<Value, FetchFailure> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchFailure::Backend {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchFailure::Malformed(e.to_string()))
    }

    fn count_failure(failure: &FetchFailure) {
        let kind = match failure {
            FetchFailure::Backend { .. } => "backend",
            FetchFailure::Transport(_) => "transport",
            FetchFailure::Malformed(_) => "malformed",
            FetchFailure::InvalidQuery(_) => "invalid_query",
            FetchFailure::Cancelled => "cancelled",
        };
        metrics::counter!("posthog.fetch_failures", "kind" => kind).increment(1);
    }
}

#[async_trait]
impl RowSource for PostHogClient {
    async fn fetch(&self, query: &RowQuery) -> Result<Vec<EventRecord>, FetchFailure> {
        let hogql = build_row_query(query, self.max_rows)?;
        debug!(
            event = %query.event_name,
            window = %query.window.from_text(),
            "Running HogQL query"
        );

        let request = self
            .client
            .post(self.project_url("query/"))
            .json(&hogql.request_body());
        let body = match self.read_json(request).await {
            Ok(body) => body,
            Err(failure) => {
                Self::count_failure(&failure);
                return Err(failure);
            }
        };

        let rows = decode_rows(&body, query)?;
        metrics::counter!("posthog.rows_fetched").increment(rows.len() as u64);
        Ok(rows)
    }
}

#[async_trait]
impl DashboardSource for PostHogClient {
    async fn dashboard(&self, id: &str) -> Result<Dashboard, FetchFailure> {
        let request = self.client.get(self.project_url(&format!("dashboards/{id}")));
        let body = self.read_json(request).await.inspect_err(Self::count_failure)?;
        Ok(decode_dashboard(id, &body))
    }

    async fn insight(&self, id: i64) -> Result<Value, FetchFailure> {
        let request = self.client.get(self.project_url(&format!("insights/{id}")));
        self.read_json(request).await.inspect_err(Self::count_failure)
    }
}

// ─── Decoding ───────────────────────────────────────────────────────────────

/// Turn a HogQL `results` payload into event records. Rows with a missing
/// actor or an unreadable timestamp are skipped with a warning.
pub fn decode_rows(body: &Value, query: &RowQuery) -> Result<Vec<EventRecord>, FetchFailure> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchFailure::Malformed("response has no 'results' array".to_string()))?;

    let mut records = Vec::with_capacity(results.len());
    for (index, row) in results.iter().enumerate() {
        let Some(cells) = row.as_array() else {
            return Err(FetchFailure::Malformed(format!("row {index} is not an array")));
        };
        match decode_row(cells, query) {
            Some(record) => records.push(record),
            None => warn!(event = %query.event_name, row = index, "Skipping undecodable row"),
        }
    }
    Ok(records)
}

fn decode_row(cells: &[Value], query: &RowQuery) -> Option<EventRecord> {
    let event_name = cells
        .first()
        .and_then(Value::as_str)
        .unwrap_or(&query.event_name)
        .to_string();
    let platform = Platform::from_os(cells.get(1).and_then(Value::as_str));
    let actor_id = cells.get(2).and_then(cell_text)?;
    let timestamp = cells.get(3).and_then(Value::as_str).and_then(parse_timestamp)?;
    let session_id = cells.get(4).and_then(cell_text);

    let mut properties = Properties::new();
    for (offset, key) in query.projected_properties.iter().enumerate() {
        if let Some(value) = cells.get(FIXED_COLUMNS.len() + offset) {
            properties.insert(key.clone(), value.clone());
        }
    }

    Some(EventRecord {
        event_name,
        platform,
        actor_id,
        timestamp,
        session_id,
        properties,
    })
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Pinned insights in tile order. Tiles without an insight (text cards) are
/// dropped.
pub fn decode_dashboard(id: &str, body: &Value) -> Dashboard {
    let insights = body
        .get("tiles")
        .and_then(Value::as_array)
        .map(|tiles| {
            tiles
                .iter()
                .filter_map(|tile| {
                    let insight = tile.get("insight")?;
                    Some(InsightRef {
                        id: insight.get("id")?.as_i64()?,
                        name: insight
                            .get("name")
                            .and_then(Value::as_str)
                            .filter(|n| !n.is_empty())
                            .unwrap_or("Unnamed")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Dashboard {
        id: id.to_string(),
        name: body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        insights,
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
