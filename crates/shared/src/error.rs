use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotLoaded,
    InvalidBinary,
    Rejected,
    Internal,
}

/// Failure reported by the engine in place of a command reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("no binary is loaded")]
    NotLoaded,
    #[error("invalid binary: {0}")]
    InvalidBinary(String),
    #[error("engine rejected command: {0}")]
    RemoteRejected(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("engine transport failure: {0}")]
    Transport(String),
}

impl From<EngineFailure> for EngineError {
    fn from(value: EngineFailure) -> Self {
        match value.code {
            ErrorCode::NotLoaded => EngineError::NotLoaded,
            ErrorCode::InvalidBinary => EngineError::InvalidBinary(value.message),
            ErrorCode::Rejected | ErrorCode::Internal => EngineError::RemoteRejected(value.message),
        }
    }
}

impl From<EngineError> for EngineFailure {
    fn from(value: EngineError) -> Self {
        let message = value.to_string();
        let code = match value {
            EngineError::NotLoaded => ErrorCode::NotLoaded,
            EngineError::InvalidBinary(_) => ErrorCode::InvalidBinary,
            EngineError::RemoteRejected(_) => ErrorCode::Rejected,
            EngineError::ProtocolViolation(_) | EngineError::Transport(_) => ErrorCode::Internal,
        };
        Self { code, message }
    }
}
