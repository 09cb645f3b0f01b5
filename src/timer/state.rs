use serde::{Deserialize, Serialize};

use super::protocol::{TimerCommand, TimerEvent};

pub const DEFAULT_MAX_MINUTES: u64 = 180;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl TimerPhase {
    pub fn is_active(self) -> bool {
        matches!(self, TimerPhase::Running | TimerPhase::Paused)
    }
}

/// Authoritative countdown state. Every transition returns the events it
/// produced; a transition that does not apply returns nothing and leaves the
/// state untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: TimerPhase,
    pub remaining_seconds: u64,
    pub total_duration_seconds: u64,
    pub max_duration_seconds: u64,
    #[serde(skip)]
    warned: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(0, DEFAULT_MAX_MINUTES * 60)
    }
}

impl TimerState {
    pub fn new(duration_seconds: u64, max_duration_seconds: u64) -> Self {
        Self {
            phase: TimerPhase::Idle,
            remaining_seconds: duration_seconds,
            total_duration_seconds: duration_seconds,
            max_duration_seconds,
            warned: false,
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.total_duration_seconds
            .saturating_sub(self.remaining_seconds)
    }

    pub fn apply(&mut self, command: TimerCommand) -> Vec<TimerEvent> {
        match command {
            TimerCommand::Configure { duration_seconds } => {
                self.configure(duration_seconds);
                Vec::new()
            }
            TimerCommand::Start { duration_seconds } => self.start(duration_seconds),
            TimerCommand::Pause => self.pause(),
            TimerCommand::Resume => self.resume(),
            TimerCommand::Stop => self.stop(),
            TimerCommand::Reset { duration_seconds } => self.reset(duration_seconds),
            TimerCommand::Extend { minutes_to_add } => self.extend(minutes_to_add),
        }
    }

    pub fn configure(&mut self, duration_seconds: u64) {
        if self.phase != TimerPhase::Idle {
            return;
        }
        self.arm(duration_seconds);
    }

    pub fn start(&mut self, duration_seconds: u64) -> Vec<TimerEvent> {
        if self.phase != TimerPhase::Idle || duration_seconds == 0 {
            return Vec::new();
        }
        self.arm(duration_seconds);
        self.phase = TimerPhase::Running;
        vec![
            TimerEvent::Started {
                total_seconds: self.total_duration_seconds,
            },
            TimerEvent::tick(self.remaining_seconds),
        ]
    }

    pub fn pause(&mut self) -> Vec<TimerEvent> {
        if self.phase != TimerPhase::Running {
            return Vec::new();
        }
        self.phase = TimerPhase::Paused;
        vec![TimerEvent::Paused]
    }

    pub fn resume(&mut self) -> Vec<TimerEvent> {
        if self.phase != TimerPhase::Paused {
            return Vec::new();
        }
        self.phase = TimerPhase::Running;
        vec![TimerEvent::Resumed]
    }

    pub fn stop(&mut self) -> Vec<TimerEvent> {
        if !self.phase.is_active() {
            return Vec::new();
        }
        let stopped = TimerEvent::Stopped {
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_duration_seconds,
        };
        // Back to a freshly configured run so Idle keeps remaining == total.
        self.arm(self.total_duration_seconds);
        self.phase = TimerPhase::Idle;
        vec![stopped]
    }

    pub fn reset(&mut self, duration_seconds: u64) -> Vec<TimerEvent> {
        self.phase = TimerPhase::Idle;
        self.arm(duration_seconds);
        vec![
            TimerEvent::reset_complete(duration_seconds),
            TimerEvent::tick(duration_seconds),
        ]
    }

    pub fn extend(&mut self, minutes_to_add: u64) -> Vec<TimerEvent> {
        if !self.can_extend(minutes_to_add) {
            return Vec::new();
        }
        let added_seconds = minutes_to_add.saturating_mul(60);
        self.total_duration_seconds = self.total_duration_seconds.saturating_add(added_seconds);
        self.remaining_seconds = self.remaining_seconds.saturating_add(added_seconds);
        vec![
            TimerEvent::tick(self.remaining_seconds),
            TimerEvent::Extended {
                added: minutes_to_add,
                total_seconds: self.total_duration_seconds,
            },
        ]
    }

    pub fn can_extend(&self, minutes_to_add: u64) -> bool {
        self.phase.is_active()
            && minutes_to_add > 0
            && self
                .total_duration_seconds
                .saturating_add(minutes_to_add.saturating_mul(60))
                <= self.max_duration_seconds
    }

    /// Advances the countdown by one whole second.
    pub fn tick(&mut self) -> Vec<TimerEvent> {
        if self.phase != TimerPhase::Running {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(3);
        if self.remaining_seconds == 0 {
            return self.complete(events);
        }

        self.remaining_seconds -= 1;
        events.push(TimerEvent::tick(self.remaining_seconds));

        match self.remaining_seconds {
            1 => self.warn(&mut events),
            0 => {
                self.warn(&mut events);
                return self.complete(events);
            }
            _ => {}
        }
        events
    }

    fn warn(&mut self, events: &mut Vec<TimerEvent>) {
        if !self.warned {
            self.warned = true;
            events.push(TimerEvent::PlaySound);
        }
    }

    fn complete(&mut self, mut events: Vec<TimerEvent>) -> Vec<TimerEvent> {
        self.phase = TimerPhase::Completed;
        self.remaining_seconds = 0;
        events.push(TimerEvent::Completed {
            total_seconds: self.total_duration_seconds,
        });
        events
    }

    fn arm(&mut self, duration_seconds: u64) {
        self.total_duration_seconds = duration_seconds;
        self.remaining_seconds = duration_seconds;
        self.warned = false;
    }
}
