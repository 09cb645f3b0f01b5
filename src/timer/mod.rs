pub mod engine;
pub mod protocol;
pub mod state;

pub use engine::{EngineConfig, TimerEngine, TimerHandle};
pub use protocol::{TimerCommand, TimerEvent};
pub use state::{TimerPhase, TimerState, DEFAULT_MAX_MINUTES};
