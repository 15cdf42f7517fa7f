//! Error kinds surfaced to callers. Parse/load errors carry a
//! message and never enter the search; illegality inside the search is
//! handled by the normal move-generation/legality path, not by this enum.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidPosition(String),
    InvalidModel(String),
    InvalidMove(String),
    ResourceExhausted(String),
    Cancelled(String),
    Internal(String),
}

impl EngineError {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EngineError::InvalidPosition(_) => "InvalidPosition",
            EngineError::InvalidModel(_) => "InvalidModel",
            EngineError::InvalidMove(_) => "InvalidMove",
            EngineError::ResourceExhausted(_) => "ResourceExhausted",
            EngineError::Cancelled(_) => "Cancelled",
            EngineError::Internal(_) => "Internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            EngineError::InvalidPosition(m)
            | EngineError::InvalidModel(m)
            | EngineError::InvalidMove(m)
            | EngineError::ResourceExhausted(m)
            | EngineError::Cancelled(m)
            | EngineError::Internal(m) => m,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind_str(), self.message())
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = Result<T, EngineError>;
