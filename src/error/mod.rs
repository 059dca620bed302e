//! Error types for turnkit.

pub mod unified;

pub use unified::{ErrorCategory, FailureKind};

use thiserror::Error;

use crate::types::TurnId;

/// Primary error type for all turnkit operations.
#[derive(Error, Debug)]
pub enum TurnError {
    /// A turn is already active, or a revert was attempted mid-turn.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The producer's event feed violated ordering or pairing rules.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The agent producer failed internally.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The terminal response was malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Turn not found: {0}")]
    NotFound(String),

    #[error("Turn timed out after {0}ms")]
    Timeout(u64),

    #[error("Turn was cancelled")]
    Cancelled,

    /// The relay stopped accepting events (turn ended or was cancelled).
    #[error("Event relay closed")]
    RelayClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TurnError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// `NotFound` for a revert target that is absent or carries no snapshot.
    pub fn turn_not_found(turn_id: TurnId) -> Self {
        Self::NotFound(format!("turn {turn_id} has no snapshot in the history log"))
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Execution(_) => ErrorCategory::Execution,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Cancelled | Self::RelayClosed => ErrorCategory::Cancellation,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Storage(_) | Self::Serialization(_) => ErrorCategory::Storage,
        }
    }

    /// Whether this error ends an in-flight turn as failed.
    ///
    /// Synchronous rejections (`Conflict`, `NotFound`) and cancellation never
    /// fail a turn.
    pub fn is_turn_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Conflict
                | ErrorCategory::NotFound
                | ErrorCategory::Cancellation
                | ErrorCategory::Configuration
        )
    }

    /// The failure kind recorded on a turn that this error terminated.
    pub fn failure_kind(&self) -> FailureKind {
        match self.category() {
            ErrorCategory::Protocol => FailureKind::Protocol,
            ErrorCategory::Validation => FailureKind::Validation,
            ErrorCategory::Timeout => FailureKind::Timeout,
            ErrorCategory::Storage => FailureKind::Storage,
            _ => FailureKind::Execution,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnError>;
