//! Runtime error types.

use procflow_core::{CoreError, ProcessKey};
use thiserror::Error;

/// Errors from the process runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("process already started: {key}")]
    AlreadyStarted { key: ProcessKey },

    #[error("process not found: {key}")]
    NotFound { key: ProcessKey },

    #[error("definition not registered: {name}")]
    DefinitionNotRegistered { name: String },

    #[error("definition already registered: {name}")]
    DefinitionRegistered { name: String },

    #[error("process stopped before replying: {key}")]
    Stopped { key: ProcessKey },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RuntimeError {
    /// Returns an error code suitable for callers and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyStarted { .. } => "ALREADY_STARTED",
            RuntimeError::NotFound { .. } => "NOT_FOUND",
            RuntimeError::DefinitionNotRegistered { .. } => "DEFINITION_NOT_REGISTERED",
            RuntimeError::DefinitionRegistered { .. } => "DEFINITION_REGISTERED",
            RuntimeError::Stopped { .. } => "STOPPED",
            RuntimeError::Core(e) => e.error_code(),
        }
    }

    /// True if the failing operation left the target instance unchanged.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RuntimeError::Core(e) => e.is_recoverable(),
            RuntimeError::AlreadyStarted { .. }
            | RuntimeError::NotFound { .. }
            | RuntimeError::DefinitionNotRegistered { .. }
            | RuntimeError::DefinitionRegistered { .. } => true,
            RuntimeError::Stopped { .. } => false,
        }
    }
}
