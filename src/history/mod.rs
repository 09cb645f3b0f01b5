//! History entries and the store they are committed to.
//!
//! The store is an external collaborator reached through [`HistoryStore`].
//! The session controller keeps its own ordered view plus a SQLite cache and
//! treats the store as best-effort.

pub mod memory;
pub mod metrics;
pub mod offline;
pub mod remote;

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use offline::OfflineStore;
pub use remote::RemoteHistoryStore;

const PLACEHOLDER_PREFIX: &str = "local-";

pub fn placeholder_id() -> String {
    format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4())
}

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub duration_minutes: u64,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn is_synced(&self) -> bool {
        !is_placeholder_id(&self.id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn to_new(&self) -> NewHistoryEntry {
        NewHistoryEntry {
            description: self.description.clone(),
            tags: self.tags.clone(),
            duration_minutes: self.duration_minutes,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

/// The record handed to the store; the store answers with the id it chose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryEntry {
    pub description: String,
    pub tags: Vec<String>,
    pub duration_minutes: u64,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
}

impl NewHistoryEntry {
    pub fn with_id(self, id: impl Into<String>) -> HistoryEntry {
        HistoryEntry {
            id: id.into(),
            description: self.description,
            tags: self.tags,
            duration_minutes: self.duration_minutes,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

/// Newest first, by start time.
pub fn sort_newest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| b.start_timestamp.cmp(&a.start_timestamp));
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("history store rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response from history store: {0}")]
    InvalidResponse(String),

    #[error("history store configuration error: {0}")]
    Configuration(String),
}

/// Remote persistence for committed sessions.
///
/// `list` has no ordering guarantee.
pub trait HistoryStore: Clone + Send + Sync + 'static {
    fn create(
        &self,
        entry: NewHistoryEntry,
    ) -> impl Future<Output = Result<HistoryEntry, StoreError>> + Send;

    fn list(&self) -> impl Future<Output = Result<Vec<HistoryEntry>, StoreError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
