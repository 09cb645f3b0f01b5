use thiserror::Error;

/// Validation failures at the command boundary. None of them mutates state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("please enter what you are working on before starting")]
    EmptyDescription,

    #[error("please set a countdown duration")]
    ZeroDuration,

    #[error("a session is already in progress")]
    AlreadyActive,

    #[error("no session is in progress")]
    NoActiveSession,

    #[error("minutes to add must be at least 1")]
    ZeroExtension,

    #[error("cannot add time, maximum countdown duration is {max_minutes} minutes")]
    ExceedsMaximum { max_minutes: u64 },

    #[error("the timer engine has stopped")]
    EngineGone,
}
