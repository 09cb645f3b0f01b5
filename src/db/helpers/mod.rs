use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("failed to encode tags")
}

pub fn decode_tags(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).with_context(|| format!("failed to decode tags {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_counts() {
        assert!(to_u64(-1, "duration_minutes").is_err());
        assert_eq!(to_u64(25, "duration_minutes").unwrap(), 25);
    }

    #[test]
    fn tags_survive_storage_with_repeats() {
        let tags = vec!["work".to_string(), "urgent".into(), "work".into()];
        assert_eq!(decode_tags(&encode_tags(&tags).unwrap()).unwrap(), tags);
    }

    #[test]
    fn datetimes_are_normalised_to_utc() {
        let parsed = parse_datetime("2025-03-14T19:00:00+10:00", "start_time").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-14T09:00:00+00:00");
    }
}
