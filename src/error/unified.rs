//! Unified error classification.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing handling logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Conflict,
    Protocol,
    Execution,
    Validation,
    NotFound,
    Timeout,
    Cancellation,
    Configuration,
    Storage,
}

/// Why a turn ended in `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Protocol,
    Execution,
    Validation,
    Storage,
}
