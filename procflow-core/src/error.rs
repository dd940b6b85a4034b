//! Core error types.

use thiserror::Error;

/// Errors from definition compilation and transition execution.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("duplicate event key: {key}")]
    DuplicateEvent { key: String },

    #[error("unknown event: cannot fire '{event}' in state '{state}'")]
    UnknownEvent { state: String, event: String },

    #[error("input rejected for event '{event}': {reason}")]
    InputRejected { event: String, reason: String },

    #[error("invalid result '{result}' from event '{event}' (declared: {allowed})")]
    InvalidResult {
        event: String,
        result: String,
        allowed: String,
    },

    #[error("hook '{stage}' failed: {reason}")]
    Hook { stage: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns whether the failing event left the instance unchanged.
    ///
    /// `InvalidResult` and hook failures are defects: the instance may be
    /// partially transitioned and must not be retried blindly.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownEvent { .. } | CoreError::InputRejected { .. }
        )
    }

    /// Returns an error code suitable for callers and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            CoreError::DuplicateEvent { .. } => "DUPLICATE_EVENT",
            CoreError::UnknownEvent { .. } => "UNKNOWN_EVENT",
            CoreError::InputRejected { .. } => "INPUT_REJECTED",
            CoreError::InvalidResult { .. } => "INVALID_RESULT",
            CoreError::Hook { .. } => "HOOK_FAILED",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}
