use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::{
    db::Database,
    history::{is_placeholder_id, placeholder_id, sort_newest_first, HistoryEntry, HistoryStore},
    notify::{signal, Cue, Notifier},
    timer::{TimerCommand, TimerEvent, TimerHandle, TimerPhase},
};

use super::{manual_minutes, natural_minutes, Session, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub duration_seconds: u64,
    pub max_minutes: u64,
    pub max_custom_minutes: u64,
}

/// What the surface paints. Mirrors the engine through its events only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub phase: TimerPhase,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
}

impl TimerView {
    fn idle(duration_seconds: u64) -> Self {
        Self {
            phase: TimerPhase::Idle,
            remaining_seconds: duration_seconds,
            total_seconds: duration_seconds,
        }
    }

    /// `MM:SS`; minutes are not wrapped at 60.
    pub fn clock(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }
}

/// Result of a background store submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub placeholder_id: String,
    pub result: Result<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerInput {
    Timer(TimerEvent),
    Commit(CommitOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Committed(HistoryEntry),
    Synced {
        placeholder_id: String,
        canonical_id: String,
    },
    SyncFailed {
        placeholder_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Remote,
    Cache,
}

/// Owns the current session and the in-memory history. Every mutation goes
/// through `&mut self`, driven by one loop that feeds it engine events and
/// commit outcomes.
pub struct SessionController<S: HistoryStore> {
    timer: TimerHandle,
    events: mpsc::UnboundedReceiver<TimerEvent>,
    store: S,
    cache: Database,
    notifier: Arc<dyn Notifier>,
    limits: SessionLimits,
    session: Option<Session>,
    manual_completion: bool,
    view: TimerView,
    view_tx: watch::Sender<TimerView>,
    history: Vec<HistoryEntry>,
    outcome_tx: mpsc::UnboundedSender<CommitOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<CommitOutcome>,
    in_flight: usize,
}

impl<S: HistoryStore> SessionController<S> {
    pub fn new(
        timer: TimerHandle,
        events: mpsc::UnboundedReceiver<TimerEvent>,
        store: S,
        cache: Database,
        notifier: Arc<dyn Notifier>,
        limits: SessionLimits,
    ) -> Self {
        let view = TimerView::idle(limits.duration_seconds);
        let (view_tx, _) = watch::channel(view);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        Self {
            timer,
            events,
            store,
            cache,
            notifier,
            limits,
            session: None,
            manual_completion: false,
            view,
            view_tx,
            history: Vec::new(),
            outcome_tx,
            outcome_rx,
            in_flight: 0,
        }
    }

    pub fn view(&self) -> TimerView {
        self.view
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerView> {
        self.view_tx.subscribe()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Store submissions that have not reported back yet.
    pub fn pending_commits(&self) -> usize {
        self.in_flight
    }

    pub fn begin_session(&mut self, description: &str) -> Result<&Session, SessionError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SessionError::EmptyDescription);
        }
        if self.limits.duration_seconds == 0 {
            return Err(SessionError::ZeroDuration);
        }
        if self.session.is_some() || self.view.phase.is_active() {
            return Err(SessionError::AlreadyActive);
        }

        self.send(TimerCommand::Start {
            duration_seconds: self.limits.duration_seconds,
        })?;

        let session = Session::new(description, Utc::now());
        info!(
            "session started: {:?} ({} tags, {}s)",
            session.description,
            session.tags.len(),
            self.limits.duration_seconds
        );
        self.manual_completion = false;
        Ok(&*self.session.insert(session))
    }

    /// Stops the run early. The entry is committed once the engine reports
    /// the stop with its reconciled clock.
    pub fn complete_session(&mut self) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        if self.manual_completion {
            return Ok(());
        }
        self.send(TimerCommand::Stop)?;
        self.manual_completion = true;
        Ok(())
    }

    /// Abandons the session. Nothing is written.
    pub fn reset_session(&mut self) -> Result<(), SessionError> {
        if let Some(session) = self.session.take() {
            info!("session abandoned: {:?}", session.description);
        }
        self.manual_completion = false;
        self.send(TimerCommand::Reset {
            duration_seconds: self.limits.duration_seconds,
        })
    }

    pub fn extend_session(&mut self, minutes: u64) -> Result<(), SessionError> {
        if self.session.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        if minutes == 0 {
            return Err(SessionError::ZeroExtension);
        }

        let projected = self
            .view
            .total_seconds
            .saturating_add(minutes.saturating_mul(60));
        if projected > self.limits.max_minutes.saturating_mul(60) {
            return Err(SessionError::ExceedsMaximum {
                max_minutes: self.limits.max_minutes,
            });
        }

        self.send(TimerCommand::Extend {
            minutes_to_add: minutes,
        })?;
        // Back-to-back extensions must see each other before the engine
        // answers. If the run ends before the engine applies this one, the
        // `Completed`/`Stopped` snapshot replaces the projected total.
        self.view.total_seconds = projected;
        Ok(())
    }

    pub fn pause_session(&self) -> Result<(), SessionError> {
        self.send(TimerCommand::Pause)
    }

    pub fn resume_session(&self) -> Result<(), SessionError> {
        self.send(TimerCommand::Resume)
    }

    pub fn toggle_pause(&self) -> Result<(), SessionError> {
        match self.view.phase {
            TimerPhase::Running => self.pause_session(),
            TimerPhase::Paused => self.resume_session(),
            TimerPhase::Idle | TimerPhase::Completed => Ok(()),
        }
    }

    /// Sets the duration used by the next session. Returns the clamped value.
    pub fn set_duration_minutes(&mut self, minutes: u64) -> Result<u64, SessionError> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        let minutes = minutes.clamp(1, self.limits.max_custom_minutes.max(1));
        self.limits.duration_seconds = minutes * 60;
        self.send(TimerCommand::Reset {
            duration_seconds: self.limits.duration_seconds,
        })?;
        Ok(minutes)
    }

    /// Waits for the next engine event or store outcome. `None` once the
    /// engine has shut down.
    pub async fn next_input(&mut self) -> Option<ControllerInput> {
        tokio::select! {
            biased;
            event = self.events.recv() => event.map(ControllerInput::Timer),
            Some(outcome) = self.outcome_rx.recv() => Some(ControllerInput::Commit(outcome)),
        }
    }

    pub async fn handle_input(&mut self, input: ControllerInput) -> Option<SessionUpdate> {
        match input {
            ControllerInput::Timer(event) => self.on_timer_event(event).await,
            ControllerInput::Commit(outcome) => Some(self.on_commit_outcome(outcome).await),
        }
    }

    pub async fn on_timer_event(&mut self, event: TimerEvent) -> Option<SessionUpdate> {
        let update = match event {
            TimerEvent::Tick { minutes, seconds } => {
                self.view.remaining_seconds = minutes * 60 + seconds;
                None
            }
            TimerEvent::Started { total_seconds } => {
                self.view = TimerView {
                    phase: TimerPhase::Running,
                    remaining_seconds: total_seconds,
                    total_seconds,
                };
                None
            }
            TimerEvent::Paused => {
                self.view.phase = TimerPhase::Paused;
                None
            }
            TimerEvent::Resumed => {
                self.view.phase = TimerPhase::Running;
                None
            }
            TimerEvent::Extended {
                added,
                total_seconds,
            } => {
                info!("added {added} min, run is now {total_seconds}s");
                self.view.total_seconds = total_seconds;
                None
            }
            TimerEvent::ResetComplete { minutes, seconds } => {
                self.view = TimerView::idle(minutes * 60 + seconds);
                None
            }
            TimerEvent::PlaySound => {
                signal(self.notifier.as_ref(), Cue::Warning, None);
                None
            }
            TimerEvent::Stopped {
                remaining_seconds,
                total_seconds,
            } => self.on_stopped(remaining_seconds, total_seconds).await,
            TimerEvent::Completed { total_seconds } => self.on_completed(total_seconds).await,
        };

        self.view_tx.send_replace(self.view);
        update
    }

    async fn on_stopped(&mut self, remaining_seconds: u64, total_seconds: u64) -> Option<SessionUpdate> {
        self.view = TimerView::idle(total_seconds);
        if !std::mem::take(&mut self.manual_completion) {
            return None;
        }

        let session = self.session.take()?;
        let elapsed = total_seconds.saturating_sub(remaining_seconds);
        let update = self.commit(session, manual_minutes(elapsed)).await;
        self.acknowledge();
        Some(update)
    }

    async fn on_completed(&mut self, total_seconds: u64) -> Option<SessionUpdate> {
        self.view = TimerView {
            phase: TimerPhase::Completed,
            remaining_seconds: 0,
            total_seconds,
        };
        // A stop racing natural expiry loses; the engine ignores it.
        self.manual_completion = false;

        let session = self.session.take();
        signal(
            self.notifier.as_ref(),
            Cue::Completed,
            session.as_ref().map(|s| s.description.as_str()),
        );
        let update = match session {
            Some(session) => Some(self.commit(session, natural_minutes(total_seconds)).await),
            None => None,
        };
        self.acknowledge();
        update
    }

    fn acknowledge(&self) {
        let _ = self.send(TimerCommand::Reset {
            duration_seconds: self.limits.duration_seconds,
        });
    }

    async fn commit(&mut self, session: Session, duration_minutes: u64) -> SessionUpdate {
        let entry = HistoryEntry {
            id: placeholder_id(),
            description: session.description,
            tags: session.tags,
            duration_minutes,
            start_timestamp: session.start_timestamp,
            end_timestamp: Utc::now(),
        };
        info!(
            "committing {} minutes for {:?} as {}",
            entry.duration_minutes, entry.description, entry.id
        );

        self.history.insert(0, entry.clone());
        if let Err(err) = self.cache.insert_history_entry(&entry).await {
            error!("failed to cache history entry {}: {err:#}", entry.id);
        }
        self.submit(&entry);
        SessionUpdate::Committed(entry)
    }

    fn submit(&mut self, entry: &HistoryEntry) {
        let store = self.store.clone();
        let outcomes = self.outcome_tx.clone();
        let placeholder_id = entry.id.clone();
        let record = entry.to_new();

        self.in_flight += 1;
        tokio::spawn(async move {
            let result = store
                .create(record)
                .await
                .map(|created| created.id)
                .map_err(|err| err.to_string());
            let _ = outcomes.send(CommitOutcome {
                placeholder_id,
                result,
            });
        });
    }

    async fn on_commit_outcome(&mut self, outcome: CommitOutcome) -> SessionUpdate {
        self.in_flight = self.in_flight.saturating_sub(1);
        let CommitOutcome {
            placeholder_id,
            result,
        } = outcome;

        match result {
            Ok(canonical_id) => {
                if let Some(entry) = self.history.iter_mut().find(|e| e.id == placeholder_id) {
                    entry.id = canonical_id.clone();
                }
                match self
                    .cache
                    .reconcile_history_id(&placeholder_id, &canonical_id)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!("cached entry {placeholder_id} vanished before sync"),
                    Err(err) => error!("failed to reconcile {placeholder_id}: {err:#}"),
                }
                info!("history entry {placeholder_id} stored as {canonical_id}");
                SessionUpdate::Synced {
                    placeholder_id,
                    canonical_id,
                }
            }
            Err(reason) => {
                warn!("history entry {placeholder_id} kept locally: {reason}");
                SessionUpdate::SyncFailed {
                    placeholder_id,
                    reason,
                }
            }
        }
    }

    /// Waits until every in-flight submission has reported back.
    pub async fn settle(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while self.in_flight > 0 {
            match self.outcome_rx.recv().await {
                Some(outcome) => updates.push(self.on_commit_outcome(outcome).await),
                None => break,
            }
        }
        updates
    }

    /// Refreshes the in-memory history from the store, or from the local
    /// cache when the store cannot be reached.
    pub async fn load_history(&mut self) -> HistorySource {
        match self.store.list().await {
            Ok(mut entries) => {
                let pending = self.cache.list_unsynced_history().await.unwrap_or_else(|err| {
                    error!("failed to read unsynced entries: {err:#}");
                    Vec::new()
                });
                if let Err(err) = self.cache.replace_history(&entries).await {
                    error!("failed to refresh history cache: {err:#}");
                }
                entries.extend(pending);
                sort_newest_first(&mut entries);
                self.history = entries;
                HistorySource::Remote
            }
            Err(err) => {
                warn!("history store unreachable, using local cache: {err}");
                self.history = self.cache.list_history().await.unwrap_or_else(|err| {
                    error!("failed to read history cache: {err:#}");
                    Vec::new()
                });
                HistorySource::Cache
            }
        }
    }

    pub async fn delete_entry(&mut self, id: &str) -> Result<()> {
        if !is_placeholder_id(id) {
            self.store
                .delete(id)
                .await
                .with_context(|| format!("failed to delete history entry {id}"))?;
        }
        self.cache.delete_history_entry(id).await?;
        self.history.retain(|entry| entry.id != id);
        info!("deleted history entry {id}");
        Ok(())
    }

    /// Returns how many cached entries were removed.
    pub async fn clear_history(&mut self) -> Result<usize> {
        self.store
            .clear()
            .await
            .context("failed to clear history store")?;
        let removed = self.cache.clear_history().await?;
        self.history.clear();
        info!("cleared {removed} cached history entries");
        Ok(removed)
    }

    /// Resubmits every entry still carrying a placeholder id. Outcomes
    /// arrive through [`Self::next_input`] or [`Self::settle`].
    pub async fn resync_pending(&mut self) -> Result<usize> {
        let pending = self.cache.list_unsynced_history().await?;
        for entry in &pending {
            self.submit(entry);
        }
        if !pending.is_empty() {
            info!("resubmitting {} unsynced history entries", pending.len());
        }
        Ok(pending.len())
    }

    fn send(&self, command: TimerCommand) -> Result<(), SessionError> {
        if self.timer.send(command) {
            Ok(())
        } else {
            Err(SessionError::EngineGone)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use tempfile::TempDir;

    struct Harness {
        controller: SessionController<MemoryStore>,
        commands: mpsc::UnboundedReceiver<TimerCommand>,
        store: MemoryStore,
        cache: Database,
        _dir: TempDir,
    }

    struct Silent;

    impl Notifier for Silent {
        fn play(&self, _cue: Cue, _detail: Option<&str>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn harness(minutes: u64) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = Database::new(dir.path().join("history.sqlite3")).unwrap();
        let store = MemoryStore::new();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (_event_tx, events) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            TimerHandle::new(command_tx),
            events,
            store.clone(),
            cache.clone(),
            Arc::new(Silent),
            SessionLimits {
                duration_seconds: minutes * 60,
                max_minutes: 180,
                max_custom_minutes: 120,
            },
        );
        Harness {
            controller,
            commands,
            store,
            cache,
            _dir: dir,
        }
    }

    fn drain(commands: &mut mpsc::UnboundedReceiver<TimerCommand>) -> Vec<TimerCommand> {
        std::iter::from_fn(|| commands.try_recv().ok()).collect()
    }

    async fn start(h: &mut Harness, description: &str) {
        h.controller.begin_session(description).unwrap();
        let total = h.controller.limits().duration_seconds;
        h.controller
            .on_timer_event(TimerEvent::Started {
                total_seconds: total,
            })
            .await;
        h.controller.on_timer_event(TimerEvent::tick(total)).await;
    }

    #[tokio::test]
    async fn begin_validates_before_touching_the_engine() {
        let mut h = harness(25);
        assert_eq!(
            h.controller.begin_session("   ").unwrap_err(),
            SessionError::EmptyDescription
        );
        assert!(drain(&mut h.commands).is_empty());

        let session = h.controller.begin_session("  Write report #work  ").unwrap();
        assert_eq!(session.description, "Write report #work");
        assert_eq!(session.tags, vec!["work"]);
        assert_eq!(
            drain(&mut h.commands),
            vec![TimerCommand::Start {
                duration_seconds: 1500
            }]
        );

        assert_eq!(
            h.controller.begin_session("again").unwrap_err(),
            SessionError::AlreadyActive
        );
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let mut h = harness(0);
        assert_eq!(
            h.controller.begin_session("task").unwrap_err(),
            SessionError::ZeroDuration
        );
    }

    #[tokio::test]
    async fn manual_completion_commits_elapsed_minutes_rounded_up() {
        let mut h = harness(25);
        start(&mut h, "Write report #work").await;
        h.controller.on_timer_event(TimerEvent::tick(1400)).await;

        h.controller.complete_session().unwrap();
        // a second request while the stop is in flight is a no-op
        h.controller.complete_session().unwrap();
        drain(&mut h.commands);

        let update = h
            .controller
            .on_timer_event(TimerEvent::Stopped {
                remaining_seconds: 1400,
                total_seconds: 1500,
            })
            .await;

        let Some(SessionUpdate::Committed(entry)) = update else {
            panic!("expected a commit, got {update:?}");
        };
        assert_eq!(entry.duration_minutes, 2);
        assert_eq!(entry.tags, vec!["work"]);
        assert!(is_placeholder_id(&entry.id));
        assert!(h.controller.session().is_none());
        assert_eq!(
            drain(&mut h.commands),
            vec![TimerCommand::Reset {
                duration_seconds: 1500
            }]
        );

        let updates = h.controller.settle().await;
        let [SessionUpdate::Synced { canonical_id, .. }] = updates.as_slice() else {
            panic!("expected one sync, got {updates:?}");
        };
        assert_eq!(h.controller.history()[0].id, *canonical_id);
        assert_eq!(h.store.snapshot().len(), 1);
        assert_eq!(h.cache.list_history().await.unwrap()[0].id, *canonical_id);
    }

    #[tokio::test]
    async fn natural_completion_commits_total_and_acknowledges() {
        let mut h = harness(25);
        start(&mut h, "Deep work").await;
        drain(&mut h.commands);

        let update = h
            .controller
            .on_timer_event(TimerEvent::Completed {
                total_seconds: 1500,
            })
            .await;
        let Some(SessionUpdate::Committed(entry)) = update else {
            panic!("expected a commit, got {update:?}");
        };
        assert_eq!(entry.duration_minutes, 25);
        assert_eq!(h.controller.view().phase, TimerPhase::Completed);
        assert_eq!(
            drain(&mut h.commands),
            vec![TimerCommand::Reset {
                duration_seconds: 1500
            }]
        );
    }

    #[tokio::test]
    async fn completion_beats_a_racing_stop() {
        let mut h = harness(1);
        start(&mut h, "short").await;
        h.controller.complete_session().unwrap();

        let first = h
            .controller
            .on_timer_event(TimerEvent::Completed { total_seconds: 60 })
            .await;
        assert!(matches!(first, Some(SessionUpdate::Committed(_))));

        // the engine would ignore the stop, but a stray stopped event must
        // not commit twice
        let second = h
            .controller
            .on_timer_event(TimerEvent::Stopped {
                remaining_seconds: 60,
                total_seconds: 60,
            })
            .await;
        assert_eq!(second, None);
        assert_eq!(h.controller.history().len(), 1);
    }

    #[tokio::test]
    async fn reset_leaves_no_trace() {
        let mut h = harness(25);
        start(&mut h, "Abandoned #work").await;
        h.controller.on_timer_event(TimerEvent::tick(1490)).await;

        h.controller.reset_session().unwrap();
        for event in [TimerEvent::reset_complete(1500), TimerEvent::tick(1500)] {
            assert_eq!(h.controller.on_timer_event(event).await, None);
        }

        assert!(h.controller.history().is_empty());
        assert_eq!(h.controller.pending_commits(), 0);
        assert!(h.cache.list_history().await.unwrap().is_empty());
        assert_eq!(h.controller.view(), TimerView::idle(1500));
    }

    #[tokio::test]
    async fn extension_past_the_cap_is_rejected() {
        let mut h = harness(175);
        start(&mut h, "Long haul").await;
        drain(&mut h.commands);

        assert_eq!(
            h.controller.extend_session(10).unwrap_err(),
            SessionError::ExceedsMaximum { max_minutes: 180 }
        );
        assert!(drain(&mut h.commands).is_empty());
        assert_eq!(h.controller.view().total_seconds, 175 * 60);

        h.controller.extend_session(5).unwrap();
        assert_eq!(
            h.controller.extend_session(1).unwrap_err(),
            SessionError::ExceedsMaximum { max_minutes: 180 }
        );
        assert_eq!(
            drain(&mut h.commands),
            vec![TimerCommand::Extend { minutes_to_add: 5 }]
        );
    }

    #[tokio::test]
    async fn unapplied_extension_gives_way_to_the_engine_total() {
        let mut h = harness(25);
        start(&mut h, "Write report").await;

        h.controller.extend_session(10).unwrap();
        assert_eq!(h.controller.view().total_seconds, 35 * 60);

        // the run expired while the extension was still queued
        let update = h
            .controller
            .on_timer_event(TimerEvent::Completed { total_seconds: 1500 })
            .await;
        let Some(SessionUpdate::Committed(entry)) = update else {
            panic!("expected a committed entry, got {update:?}");
        };
        assert_eq!(entry.duration_minutes, 25);
        assert_eq!(h.controller.view().total_seconds, 1500);
        assert_eq!(h.controller.subscribe().borrow().total_seconds, 1500);
    }

    #[tokio::test]
    async fn extension_needs_a_session_and_minutes() {
        let mut h = harness(25);
        assert_eq!(
            h.controller.extend_session(5).unwrap_err(),
            SessionError::NoActiveSession
        );
        start(&mut h, "task").await;
        assert_eq!(
            h.controller.extend_session(0).unwrap_err(),
            SessionError::ZeroExtension
        );
    }

    #[tokio::test]
    async fn failed_store_keeps_placeholder_entry() {
        let mut h = harness(25);
        h.store.set_available(false);
        start(&mut h, "Offline work").await;
        h.controller.complete_session().unwrap();
        h.controller
            .on_timer_event(TimerEvent::Stopped {
                remaining_seconds: 1000,
                total_seconds: 1500,
            })
            .await;

        let updates = h.controller.settle().await;
        assert!(matches!(updates.as_slice(), [SessionUpdate::SyncFailed { .. }]));
        assert!(!h.controller.history()[0].is_synced());
        assert_eq!(h.cache.list_unsynced_history().await.unwrap().len(), 1);

        h.store.set_available(true);
        assert_eq!(h.controller.resync_pending().await.unwrap(), 1);
        let updates = h.controller.settle().await;
        assert!(matches!(updates.as_slice(), [SessionUpdate::Synced { .. }]));
        assert!(h.controller.history()[0].is_synced());
        assert!(h.cache.list_unsynced_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_history_falls_back_to_cache() {
        let mut h = harness(25);
        start(&mut h, "cached").await;
        h.controller
            .on_timer_event(TimerEvent::Completed {
                total_seconds: 1500,
            })
            .await;
        h.controller.settle().await;

        h.store.set_available(false);
        assert_eq!(h.controller.load_history().await, HistorySource::Cache);
        assert_eq!(h.controller.history().len(), 1);

        h.store.set_available(true);
        assert_eq!(h.controller.load_history().await, HistorySource::Remote);
        assert_eq!(h.controller.history().len(), 1);
        assert!(h.controller.history()[0].is_synced());
    }

    #[tokio::test]
    async fn clear_failure_keeps_everything() {
        let mut h = harness(25);
        start(&mut h, "keep me").await;
        h.controller
            .on_timer_event(TimerEvent::Completed {
                total_seconds: 1500,
            })
            .await;
        h.controller.settle().await;

        h.store.set_available(false);
        assert!(h.controller.clear_history().await.is_err());
        assert_eq!(h.controller.history().len(), 1);

        let id = h.controller.history()[0].id.clone();
        assert!(h.controller.delete_entry(&id).await.is_err());

        h.store.set_available(true);
        h.controller.delete_entry(&id).await.unwrap();
        assert!(h.controller.history().is_empty());
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn duration_is_clamped_and_locked_during_a_session() {
        let mut h = harness(25);
        assert_eq!(h.controller.set_duration_minutes(500).unwrap(), 120);
        assert_eq!(h.controller.set_duration_minutes(0).unwrap(), 1);
        assert_eq!(
            drain(&mut h.commands),
            vec![
                TimerCommand::Reset {
                    duration_seconds: 7200
                },
                TimerCommand::Reset {
                    duration_seconds: 60
                },
            ]
        );

        start(&mut h, "task").await;
        assert_eq!(
            h.controller.set_duration_minutes(10).unwrap_err(),
            SessionError::AlreadyActive
        );
    }

    #[tokio::test]
    async fn toggle_follows_the_engine_phase() {
        let mut h = harness(25);
        h.controller.toggle_pause().unwrap();
        assert!(drain(&mut h.commands).is_empty());

        start(&mut h, "task").await;
        drain(&mut h.commands);
        h.controller.toggle_pause().unwrap();
        h.controller.on_timer_event(TimerEvent::Paused).await;
        h.controller.toggle_pause().unwrap();
        assert_eq!(
            drain(&mut h.commands),
            vec![TimerCommand::Pause, TimerCommand::Resume]
        );
    }

    #[tokio::test]
    async fn view_is_published_to_subscribers() {
        let mut h = harness(25);
        let view = h.controller.subscribe();
        start(&mut h, "task").await;
        h.controller.on_timer_event(TimerEvent::tick(1499)).await;

        let seen = *view.borrow();
        assert_eq!(seen.phase, TimerPhase::Running);
        assert_eq!(seen.clock(), "24:59");
    }

    #[tokio::test]
    async fn closed_engine_surfaces_as_error() {
        let mut h = harness(25);
        drop(h.commands);
        assert_eq!(
            h.controller.begin_session("task").unwrap_err(),
            SessionError::EngineGone
        );
        assert!(h.controller.session().is_none());
    }
}
