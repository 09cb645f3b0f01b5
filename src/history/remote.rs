//! HTTP client for the remote history API.
//!
//! The API speaks a flat JSON record: `duration` in minutes, `tags` as a
//! comma-separated string on write, and `start_time`/`end_time` as RFC 3339
//! strings. Reads are lenient: ids may be numbers or strings and tags may
//! come back as a list, a string, or null.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{HistoryEntry, HistoryStore, NewHistoryEntry, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct EntryPayload<'a> {
    description: &'a str,
    duration: u64,
    tags: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl<'a> From<&'a NewHistoryEntry> for EntryPayload<'a> {
    fn from(entry: &'a NewHistoryEntry) -> Self {
        Self {
            description: &entry.description,
            duration: entry.duration_minutes,
            tags: (!entry.tags.is_empty()).then(|| entry.tags.join(",")),
            start_time: entry.start_timestamp,
            end_time: entry.end_timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            RecordId::Number(n) => n.to_string(),
            RecordId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordTags {
    List(Vec<String>),
    Joined(String),
}

impl RecordTags {
    fn into_vec(self) -> Vec<String> {
        match self {
            RecordTags::List(tags) => tags,
            RecordTags::Joined(joined) => joined
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntryRecord {
    id: RecordId,
    description: String,
    duration: u64,
    #[serde(default)]
    tags: Option<RecordTags>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl EntryRecord {
    /// Older records predate `start_time`/`end_time`; fall back to
    /// `created_at` and skip the record when no timestamp is known at all.
    /// A missing end is derived from the duration, and a duration too large
    /// to place on the calendar skips the record too.
    fn into_entry(self) -> Option<HistoryEntry> {
        let start = self.start_time.or(self.created_at)?;
        let end = match self.end_time {
            Some(end) => end,
            None => i64::try_from(self.duration)
                .ok()
                .and_then(chrono::Duration::try_minutes)
                .and_then(|length| start.checked_add_signed(length))?,
        };
        Some(HistoryEntry {
            id: self.id.into_string(),
            description: self.description,
            tags: self.tags.map(RecordTags::into_vec).unwrap_or_default(),
            duration_minutes: self.duration,
            start_timestamp: start,
            end_timestamp: end,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RemoteHistoryStore {
    http_client: Client,
    base_url: String,
}

impl RemoteHistoryStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StoreError::Configuration("empty base url".into()));
        }

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn history_url(&self) -> String {
        format!("{}/api/history", self.base_url)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(REQUEST_TIMEOUT)
    } else if err.is_connect() {
        StoreError::Unavailable(format!("connection failed: {err}"))
    } else {
        StoreError::Unavailable(format!("request failed: {err}"))
    }
}

impl HistoryStore for RemoteHistoryStore {
    async fn create(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        let url = self.history_url();
        debug!("POST {url}");

        let response = self
            .http_client
            .post(&url)
            .json(&EntryPayload::from(&entry))
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let record: EntryRecord = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("failed to parse entry: {e}")))?;
        let id = record.id.into_string();

        // The canonical id is all the store owes us; keep the local timestamps.
        Ok(entry.with_id(id))
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let url = self.history_url();
        debug!("GET {url}");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check(response).await?;

        let records: Vec<EntryRecord> = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("failed to parse history: {e}")))?;

        let total = records.len();
        let entries: Vec<HistoryEntry> = records
            .into_iter()
            .filter_map(EntryRecord::into_entry)
            .collect();
        if entries.len() < total {
            warn!(
                "skipped {} history records without usable timestamps",
                total - entries.len()
            );
        }
        Ok(entries)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.history_url(), id);
        debug!("DELETE {url}");

        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            // Already gone remotely.
            return Ok(());
        }
        Self::check(response).await.map(|_| ())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let url = self.history_url();
        debug!("DELETE {url}");

        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await.map(|_| ())
    }
}
