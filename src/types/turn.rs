//! Turn records and lifecycle status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::events::Event;
use crate::response::Response;

use super::TurnId;

/// Turn lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Streaming,
    Completed,
    Cancelled,
    Failed { reason: FailureKind },
}

impl TurnStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed { .. }
        )
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Streaming => f.write_str("streaming"),
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One request/response cycle.
///
/// Mutated only by the orchestrator while the turn is live; frozen once its
/// status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub prompt: String,
    pub status: TurnStatus,
    /// Events in corrected order.
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(id: TurnId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            status: TurnStatus::Pending,
            events: Vec::new(),
            response: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub(crate) fn mark_streaming(&mut self) {
        if self.status == TurnStatus::Pending {
            self.status = TurnStatus::Streaming;
        }
    }

    pub(crate) fn complete(mut self, events: Vec<Event>, response: Response) -> Self {
        self.events = events;
        self.response = Some(response);
        self.freeze(TurnStatus::Completed)
    }

    pub(crate) fn cancel(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self.freeze(TurnStatus::Cancelled)
    }

    pub(crate) fn fail(mut self, events: Vec<Event>, reason: FailureKind, error: impl Into<String>) -> Self {
        self.events = events;
        self.error = Some(error.into());
        self.freeze(TurnStatus::Failed { reason })
    }

    fn freeze(mut self, status: TurnStatus) -> Self {
        self.status = status;
        self.ended_at = Some(Utc::now());
        self
    }

    pub fn summary(&self) -> TurnSummary {
        TurnSummary {
            id: self.id,
            prompt: self.prompt.clone(),
            status: self.status,
            event_count: self.events.len(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Lightweight view of a turn for history listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub id: TurnId,
    pub prompt: String,
    pub status: TurnStatus,
    pub event_count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
