use shared::{domain::RunMode, error::EngineError};
use thiserror::Error;

/// Call-site errors returned by the dispatcher and the terminal controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("{command} is not allowed while {mode}")]
    Illegal { command: &'static str, mode: String },
    #[error("no binary is loaded")]
    NotLoaded,
    #[error("no terminal prompt is active")]
    NoPrompt,
    #[error("invalid memory offset '{input}'; showing offset 0")]
    InvalidOffset { input: String },
    #[error("invalid breakpoint address '{input}'; expected a base 16 value")]
    InvalidAddress { input: String },
    #[error("{command} did not complete within {seconds}s")]
    TimedOut { command: &'static str, seconds: u64 },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CoreError {
    pub(crate) fn illegal(command: &'static str, mode: RunMode, loaded: bool) -> Self {
        let mode = if mode == RunMode::Idle && !loaded {
            "idle with no binary loaded".to_string()
        } else {
            mode.to_string()
        };
        CoreError::Illegal { command, mode }
    }

    pub fn is_illegal(&self) -> bool {
        matches!(self, CoreError::Illegal { .. })
    }
}
