//! Terminal surface: renders the controller's view and turns typed lines
//! into session commands.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    history::{
        metrics::{group_by_day, DailyTotals},
        HistoryEntry, HistoryStore,
    },
    session::{SessionController, SessionUpdate, TimerView},
    timer::TimerPhase,
};

const DEFAULT_EXTENSION_MINUTES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    TogglePause,
    Complete,
    Reset,
    Extend(u64),
    Quit,
}

pub fn parse_key(line: &str) -> Option<Key> {
    let line = line.trim();
    if let Some(minutes) = line.strip_prefix('+') {
        let minutes = minutes.trim();
        return if minutes.is_empty() {
            Some(Key::Extend(DEFAULT_EXTENSION_MINUTES))
        } else {
            minutes.parse().ok().map(Key::Extend)
        };
    }
    match line.to_ascii_lowercase().as_str() {
        "p" | "pause" | "resume" => Some(Key::TogglePause),
        "c" | "complete" | "done" => Some(Key::Complete),
        "r" | "reset" => Some(Key::Reset),
        "q" | "quit" | "exit" => Some(Key::Quit),
        _ => None,
    }
}

pub fn status_line(view: &TimerView) -> String {
    let phase = match view.phase {
        TimerPhase::Idle => "ready",
        TimerPhase::Running => "running",
        TimerPhase::Paused => "paused",
        TimerPhase::Completed => "done",
    };
    format!("{} [{phase}]", view.clock())
}

pub fn format_entry<Tz: TimeZone>(entry: &HistoryEntry, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let start = entry.start_timestamp.with_timezone(tz);
    let end = entry.end_timestamp.with_timezone(tz);
    let sync = if entry.is_synced() { "" } else { " (not synced)" };
    format!(
        "{} - {}  {:>3} min  {}{sync}  [{}]",
        start.format("%H:%M"),
        end.format("%H:%M"),
        entry.duration_minutes,
        entry.description,
        entry.id
    )
}

pub fn print_history(entries: &[&HistoryEntry]) {
    if entries.is_empty() {
        println!("No sessions recorded yet.");
        return;
    }
    let today = Local::now().date_naive();
    for group in group_by_day(entries, today, &Local) {
        let minutes: u64 = group.entries.iter().map(|e| e.duration_minutes).sum();
        println!("{} ({} min)", group.label, minutes);
        for entry in group.entries {
            println!("  {}", format_entry(entry, &Local));
        }
    }
}

pub fn print_totals(totals: &DailyTotals) {
    println!(
        "Today: {} session{}, {} min",
        totals.sessions,
        if totals.sessions == 1 { "" } else { "s" },
        totals.minutes
    );
}

fn redraw(view: &TimerView) -> Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "\r{}   ", status_line(view)).context("failed to draw timer")?;
    out.flush().context("failed to flush timer")
}

fn report(update: &SessionUpdate) {
    match update {
        SessionUpdate::Committed(entry) => println!(
            "\nRecorded {} min for {:?}{}",
            entry.duration_minutes,
            entry.description,
            if entry.tags.is_empty() {
                String::new()
            } else {
                format!(" #{}", entry.tags.join(" #"))
            }
        ),
        SessionUpdate::Synced { canonical_id, .. } => println!("Saved as {canonical_id}."),
        SessionUpdate::SyncFailed { reason, .. } => {
            println!("Kept locally, will retry with `timespent sync`: {reason}")
        }
    }
}

/// Runs one session to its end: natural completion, mark complete, reset
/// or quit. Returns the committed entry, if any.
pub async fn run_session<S: HistoryStore>(
    controller: &mut SessionController<S>,
    description: &str,
) -> Result<Option<HistoryEntry>> {
    let session = controller.begin_session(description)?;
    println!(
        "Started {:?}{}",
        session.description,
        if session.tags.is_empty() {
            String::new()
        } else {
            format!(" (tags: {})", session.tags.join(", "))
        }
    );
    println!("p pause/resume, c complete, r reset, +N add minutes, q quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut committed = None;

    loop {
        tokio::select! {
            input = controller.next_input() => {
                let Some(input) = input else {
                    bail!("timer engine stopped unexpectedly");
                };
                let update = controller.handle_input(input).await;
                redraw(&controller.view())?;
                if let Some(update) = update {
                    report(&update);
                    if let SessionUpdate::Committed(entry) = update {
                        committed = Some(entry);
                        break;
                    }
                }
                if controller.session().is_none() {
                    println!("\nSession reset, nothing recorded.");
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line.context("failed to read input")? {
                Some(line) => match parse_key(&line) {
                    Some(Key::Quit) => {
                        controller.reset_session()?;
                        println!("Session abandoned.");
                        break;
                    }
                    Some(key) => {
                        if let Err(err) = apply_key(controller, key) {
                            println!("{err}");
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command {:?}", line.trim()),
                },
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                controller.reset_session()?;
                println!("\nInterrupted, session abandoned.");
                break;
            }
        }
    }

    for update in controller.settle().await {
        report(&update);
    }
    Ok(committed)
}

fn apply_key<S: HistoryStore>(
    controller: &mut SessionController<S>,
    key: Key,
) -> Result<(), crate::session::SessionError> {
    match key {
        Key::TogglePause => controller.toggle_pause(),
        Key::Complete => controller.complete_session(),
        Key::Reset => controller.reset_session(),
        Key::Extend(minutes) => controller.extend_session(minutes),
        Key::Quit => controller.reset_session(),
    }
}
