use serde::{Deserialize, Serialize};

/// Commands accepted by the timer engine. Commands that do not apply to the
/// current phase are ignored rather than rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum TimerCommand {
    #[serde(rename_all = "camelCase")]
    Configure { duration_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    Start { duration_seconds: u64 },
    Pause,
    Resume,
    Stop,
    #[serde(rename_all = "camelCase")]
    Reset { duration_seconds: u64 },
    #[serde(rename_all = "camelCase")]
    Extend { minutes_to_add: u64 },
}

/// Events emitted by the timer engine, in emission order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimerEvent {
    Tick {
        minutes: u64,
        seconds: u64,
    },
    #[serde(rename_all = "camelCase")]
    Started {
        total_seconds: u64,
    },
    Paused,
    Resumed,
    /// Snapshot of the clock at the moment of the stop, before the engine
    /// re-arms itself.
    #[serde(rename_all = "camelCase")]
    Stopped {
        remaining_seconds: u64,
        total_seconds: u64,
    },
    #[serde(rename_all = "camelCase")]
    Completed {
        total_seconds: u64,
    },
    ResetComplete {
        minutes: u64,
        seconds: u64,
    },
    #[serde(rename_all = "camelCase")]
    Extended {
        added: u64,
        total_seconds: u64,
    },
    /// Near-zero warning, fired once per run.
    PlaySound,
}

impl TimerEvent {
    pub fn tick(remaining_seconds: u64) -> Self {
        TimerEvent::Tick {
            minutes: remaining_seconds / 60,
            seconds: remaining_seconds % 60,
        }
    }

    pub fn reset_complete(duration_seconds: u64) -> Self {
        TimerEvent::ResetComplete {
            minutes: duration_seconds / 60,
            seconds: duration_seconds % 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_splits_minutes_and_seconds() {
        assert_eq!(
            TimerEvent::tick(1499),
            TimerEvent::Tick {
                minutes: 24,
                seconds: 59
            }
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(TimerEvent::Extended {
            added: 5,
            total_seconds: 1800,
        })
        .unwrap();
        assert_eq!(json["type"], "extended");
        assert_eq!(json["totalSeconds"], 1800);

        let json = serde_json::to_value(TimerEvent::PlaySound).unwrap();
        assert_eq!(json["type"], "playSound");
    }

    #[test]
    fn commands_deserialize_from_wire_names() {
        let command: TimerCommand =
            serde_json::from_str(r#"{"command":"extend","minutesToAdd":15}"#).unwrap();
        assert_eq!(command, TimerCommand::Extend { minutes_to_add: 15 });
    }
}
