//! Focus sessions: what the user said they are working on, and the glue
//! between the timer engine and committed history.

pub mod controller;
pub mod error;
pub mod tags;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use controller::{
    CommitOutcome, ControllerInput, HistorySource, SessionController, SessionLimits,
    SessionUpdate, TimerView,
};
pub use error::SessionError;
pub use tags::extract_hashtags;

/// A started, not yet committed, unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub description: String,
    pub tags: Vec<String>,
    pub start_timestamp: DateTime<Utc>,
}

impl Session {
    pub fn new(description: &str, start_timestamp: DateTime<Utc>) -> Self {
        Self {
            description: description.to_string(),
            tags: extract_hashtags(description),
            start_timestamp,
        }
    }
}

/// Minutes recorded when the countdown reaches zero on its own.
pub fn natural_minutes(total_seconds: u64) -> u64 {
    (total_seconds / 60).max(1)
}

/// Minutes recorded when the user completes early. Any started minute counts.
pub fn manual_minutes(elapsed_seconds: u64) -> u64 {
    elapsed_seconds.div_ceil(60).max(1)
}
