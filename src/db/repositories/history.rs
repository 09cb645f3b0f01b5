use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::{
    db::{
        helpers::{decode_tags, encode_tags, parse_datetime, to_i64, to_u64},
        Database,
    },
    history::{is_placeholder_id, HistoryEntry},
};

const SELECT_COLUMNS: &str =
    "SELECT id, description, tags, duration_minutes, start_time, end_time FROM history_entries";

fn row_to_entry(row: &Row) -> Result<HistoryEntry> {
    let tags: String = row.get("tags")?;
    let duration_minutes: i64 = row.get("duration_minutes")?;
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;

    Ok(HistoryEntry {
        id: row.get("id")?,
        description: row.get("description")?,
        tags: decode_tags(&tags)?,
        duration_minutes: to_u64(duration_minutes, "duration_minutes")?,
        start_timestamp: parse_datetime(&start_time, "start_time")?,
        end_timestamp: parse_datetime(&end_time, "end_time")?,
    })
}

fn insert_entry(conn: &Connection, entry: &HistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO history_entries
             (id, description, tags, duration_minutes, start_time, end_time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.description,
            encode_tags(&entry.tags)?,
            to_i64(entry.duration_minutes)?,
            entry.start_timestamp.to_rfc3339(),
            entry.end_timestamp.to_rfc3339(),
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("failed to insert history entry {}", entry.id))?;
    Ok(())
}

impl Database {
    pub async fn insert_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| insert_entry(conn, &record)).await
    }

    /// Newest first.
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY start_time DESC"))?;
            let mut rows = stmt.query([])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    /// Entries that never got a canonical id from the remote store.
    pub async fn list_unsynced_history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .list_history()
            .await?
            .into_iter()
            .filter(|entry| is_placeholder_id(&entry.id))
            .collect())
    }

    /// Mirrors a fresh remote listing. Entries still carrying placeholder ids
    /// were never seen by the store, so they survive the swap.
    pub async fn replace_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        let records = entries.to_vec();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open history replace transaction")?;
            tx.execute(
                "DELETE FROM history_entries WHERE id NOT LIKE 'local-%'",
                [],
            )?;
            for entry in &records {
                insert_entry(&tx, entry)?;
            }
            tx.commit().context("failed to commit history replace")?;
            Ok(())
        })
        .await
    }

    pub async fn reconcile_history_id(&self, placeholder_id: &str, canonical_id: &str) -> Result<bool> {
        let placeholder_id = placeholder_id.to_string();
        let canonical_id = canonical_id.to_string();
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE history_entries SET id = ?1 WHERE id = ?2",
                    params![canonical_id, placeholder_id],
                )
                .context("failed to reconcile history id")?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn delete_history_entry(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let changed = conn
                .execute("DELETE FROM history_entries WHERE id = ?1", params![id])
                .context("failed to delete history entry")?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<usize> {
        self.execute(|conn| {
            conn.execute("DELETE FROM history_entries", [])
                .context("failed to clear history")
        })
        .await
    }
}
