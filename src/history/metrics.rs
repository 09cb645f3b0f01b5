//! Daily totals, tag filters and day grouping over committed history.
//!
//! Dates are resolved in the caller's time zone; the terminal surface passes
//! `chrono::Local`.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate, TimeZone};
use serde::Serialize;

use super::HistoryEntry;

pub const BREAK_TAG: &str = "break";

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotals {
    pub sessions: usize,
    pub minutes: u64,
}

fn local_day<Tz: TimeZone>(entry: &HistoryEntry, tz: &Tz) -> NaiveDate {
    entry.start_timestamp.with_timezone(tz).date_naive()
}

pub fn daily_totals<Tz: TimeZone>(
    entries: &[HistoryEntry],
    day: NaiveDate,
    tz: &Tz,
    exclude_breaks: bool,
) -> DailyTotals {
    entries
        .iter()
        .filter(|entry| local_day(entry, tz) == day)
        .filter(|entry| !(exclude_breaks && entry.has_tag(BREAK_TAG)))
        .fold(DailyTotals::default(), |totals, entry| DailyTotals {
            sessions: totals.sessions + 1,
            minutes: totals.minutes + entry.duration_minutes,
        })
}

pub fn filter_by_tag<'a>(entries: &'a [HistoryEntry], tag: &str) -> Vec<&'a HistoryEntry> {
    let tag = tag.trim_start_matches('#');
    entries.iter().filter(|entry| entry.has_tag(tag)).collect()
}

/// Every tag in use, sorted, without repeats.
pub fn all_tags(entries: &[HistoryEntry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup<'a> {
    pub day: NaiveDate,
    pub label: String,
    pub entries: Vec<&'a HistoryEntry>,
}

pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        "Yesterday".to_string()
    } else {
        day.format("%B %-d, %Y").to_string()
    }
}

/// Groups entries by local day, newest day first and newest entry first
/// within a day.
pub fn group_by_day<'a, Tz: TimeZone>(
    entries: &[&'a HistoryEntry],
    today: NaiveDate,
    tz: &Tz,
) -> Vec<DayGroup<'a>> {
    let mut sorted: Vec<&HistoryEntry> = entries.to_vec();
    sorted.sort_by(|a, b| b.start_timestamp.cmp(&a.start_timestamp));

    let mut groups: Vec<DayGroup<'a>> = Vec::new();
    for entry in sorted {
        let day = local_day(entry, tz);
        match groups.last_mut() {
            Some(group) if group.day == day => group.entries.push(entry),
            _ => groups.push(DayGroup {
                day,
                label: day_label(day, today),
                entries: vec![entry],
            }),
        }
    }
    groups
}
