use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{TimerCommand, TimerEvent, TimerPhase, TimerState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub initial_duration_seconds: u64,
    pub max_duration_seconds: u64,
}

/// Cloneable command side of a running engine.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    commands: mpsc::UnboundedSender<TimerCommand>,
}

impl TimerHandle {
    pub fn new(commands: mpsc::UnboundedSender<TimerCommand>) -> Self {
        Self { commands }
    }

    /// Returns false once the engine task has gone away.
    pub fn send(&self, command: TimerCommand) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(err) => {
                log_warn!("timer engine is gone, dropping {:?}", err.0);
                false
            }
        }
    }
}

/// Monotonic bookkeeping for the current running window.
///
/// The countdown never trusts the interval to fire exactly once per second;
/// it counts whole seconds elapsed since `anchor` and applies whatever has
/// not been applied yet.
#[derive(Debug, Default)]
struct RunClock {
    anchor: Option<Instant>,
    applied: u64,
    carry: Duration,
}

impl RunClock {
    fn start(&mut self, now: Instant) {
        self.anchor = Some(now);
        self.applied = 0;
        self.carry = Duration::ZERO;
    }

    fn due(&self, now: Instant) -> u64 {
        match self.anchor {
            Some(anchor) => now
                .saturating_duration_since(anchor)
                .as_secs()
                .saturating_sub(self.applied),
            None => 0,
        }
    }

    fn suspend(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor.take() {
            let elapsed = now.saturating_duration_since(anchor);
            self.carry = elapsed.saturating_sub(Duration::from_secs(self.applied));
            self.applied = 0;
        }
    }

    /// Picks up a paused window, keeping the part of a second that had
    /// already elapsed before the pause.
    fn resume(&mut self, now: Instant) -> Instant {
        let anchor = now.checked_sub(self.carry).unwrap_or(now);
        self.anchor = Some(anchor);
        self.applied = 0;
        self.carry = Duration::ZERO;
        anchor
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Owns the [`TimerState`] on its own task. Commands arrive over one
/// channel, events leave over another, and nothing else touches the state.
pub struct TimerEngine {
    state: TimerState,
    clock: RunClock,
    ticker: Option<Interval>,
    events: mpsc::UnboundedSender<TimerEvent>,
}

impl TimerEngine {
    pub fn new(config: EngineConfig, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            state: TimerState::new(
                config.initial_duration_seconds,
                config.max_duration_seconds,
            ),
            clock: RunClock::default(),
            ticker: None,
            events,
        }
    }

    /// Spawns the engine task and returns its command handle, its event
    /// stream and the task handle.
    pub fn spawn(
        config: EngineConfig,
        cancel_token: CancellationToken,
    ) -> (
        TimerHandle,
        mpsc::UnboundedReceiver<TimerEvent>,
        JoinHandle<()>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let engine = Self::new(config, event_tx);
        let handle = tokio::spawn(engine.run(command_rx, cancel_token));
        (TimerHandle::new(command_tx), event_rx, handle)
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<TimerCommand>,
        cancel_token: CancellationToken,
    ) {
        log_info!(
            "timer engine started ({}s configured, {}s max)",
            self.state.total_duration_seconds, self.state.max_duration_seconds
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, Instant::now()),
                    None => break,
                },
                _ = next_wakeup(&mut self.ticker) => self.catch_up(Instant::now()),
            }
        }

        log_info!("timer engine shutting down");
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    fn handle_command(&mut self, command: TimerCommand, now: Instant) {
        // Settle the seconds that already passed so the command sees the
        // same clock the user saw.
        self.catch_up(now);

        let before = self.state.phase;
        let events = self.state.apply(command);
        let after = self.state.phase;

        match (before, after) {
            (TimerPhase::Idle, TimerPhase::Running) => {
                self.clock.start(now);
                self.arm_ticker(now);
            }
            (TimerPhase::Paused, TimerPhase::Running) => {
                let anchor = self.clock.resume(now);
                self.arm_ticker(anchor);
            }
            (TimerPhase::Running, TimerPhase::Paused) => {
                self.clock.suspend(now);
                self.ticker = None;
            }
            (_, TimerPhase::Idle | TimerPhase::Completed) => self.halt(),
            _ => {}
        }

        if events.is_empty() {
            log_debug!("ignored {:?} while {:?}", command, before);
        }
        self.emit(events);
    }

    fn catch_up(&mut self, now: Instant) {
        if self.state.phase != TimerPhase::Running {
            return;
        }

        let due = self.clock.due(now);
        if due > 1 {
            log_debug!("applying {} overdue seconds", due);
        }

        for _ in 0..due {
            self.clock.applied += 1;
            let events = self.state.tick();
            self.emit(events);
            if self.state.phase != TimerPhase::Running {
                self.halt();
                break;
            }
        }
    }

    fn arm_ticker(&mut self, anchor: Instant) {
        let mut ticker = time::interval_at(anchor + TICK_INTERVAL, TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    fn halt(&mut self) {
        self.clock.clear();
        self.ticker = None;
    }

    fn emit(&self, events: Vec<TimerEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                log_warn!("no listener for timer event {:?}", event);
            }
        }
    }
}

async fn next_wakeup(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: u64) -> EngineConfig {
        EngineConfig {
            initial_duration_seconds: initial,
            max_duration_seconds: 180 * 60,
        }
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<TimerEvent>) -> TimerEvent {
        events.recv().await.expect("engine closed its event stream")
    }

    #[tokio::test(start_paused = true)]
    async fn start_emits_started_and_first_paint() {
        let (timer, mut events, _task) = TimerEngine::spawn(config(60), CancellationToken::new());
        timer.send(TimerCommand::Start {
            duration_seconds: 60,
        });

        assert_eq!(next(&mut events).await, TimerEvent::Started { total_seconds: 60 });
        assert_eq!(next(&mut events).await, TimerEvent::tick(60));
        assert_eq!(next(&mut events).await, TimerEvent::tick(59));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_completion_on_wall_clock() {
        let (timer, mut events, _task) = TimerEngine::spawn(config(3), CancellationToken::new());
        let started = Instant::now();
        timer.send(TimerCommand::Start {
            duration_seconds: 3,
        });

        let mut seen = Vec::new();
        loop {
            let event = next(&mut events).await;
            seen.push(event);
            if matches!(event, TimerEvent::Completed { .. }) {
                break;
            }
        }

        assert_eq!(started.elapsed().as_secs(), 3);
        assert_eq!(
            seen,
            vec![
                TimerEvent::Started { total_seconds: 3 },
                TimerEvent::tick(3),
                TimerEvent::tick(2),
                TimerEvent::tick(1),
                TimerEvent::PlaySound,
                TimerEvent::tick(0),
                TimerEvent::Completed { total_seconds: 3 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_scheduler_catches_up_without_drift() {
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new(config(600), event_tx);
        let start = Instant::now();

        engine.handle_command(
            TimerCommand::Start {
                duration_seconds: 600,
            },
            start,
        );
        engine.catch_up(start + Duration::from_millis(4_500));

        assert_eq!(engine.state().remaining_seconds, 596);
        let mut ticks = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TimerEvent::Tick { .. }) {
                ticks += 1;
            }
        }
        // the first paint plus four whole seconds
        assert_eq!(ticks, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_carries_partial_second_into_resume() {
        let (event_tx, _events) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new(config(600), event_tx);
        let start = Instant::now();

        engine.handle_command(
            TimerCommand::Start {
                duration_seconds: 600,
            },
            start,
        );
        engine.handle_command(TimerCommand::Pause, start + Duration::from_millis(2_600));
        assert_eq!(engine.state().remaining_seconds, 598);

        // a long pause does not count
        let resumed_at = start + Duration::from_secs(60);
        engine.handle_command(TimerCommand::Resume, resumed_at);
        engine.catch_up(resumed_at + Duration::from_millis(300));
        assert_eq!(engine.state().remaining_seconds, 598);
        engine.catch_up(resumed_at + Duration::from_millis(400));
        assert_eq!(engine.state().remaining_seconds, 597);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_reports_reconciled_clock() {
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new(config(1500), event_tx);
        let start = Instant::now();

        engine.handle_command(
            TimerCommand::Start {
                duration_seconds: 1500,
            },
            start,
        );
        engine.handle_command(TimerCommand::Stop, start + Duration::from_secs(100));

        let stopped = std::iter::from_fn(|| events.try_recv().ok())
            .find(|event| matches!(event, TimerEvent::Stopped { .. }));
        assert_eq!(
            stopped,
            Some(TimerEvent::Stopped {
                remaining_seconds: 1400,
                total_seconds: 1500
            })
        );
        assert_eq!(engine.state().phase, TimerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_task() {
        let token = CancellationToken::new();
        let (_timer, _events, task) = TimerEngine::spawn(config(60), token.clone());
        token.cancel();
        task.await.expect("engine task panicked");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_ends_the_task() {
        let (timer, _events, task) = TimerEngine::spawn(config(60), CancellationToken::new());
        drop(timer);
        task.await.expect("engine task panicked");
    }
}
