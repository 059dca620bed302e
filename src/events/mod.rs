//! Event vocabulary emitted by agent producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Discriminant of an [`EventPayload`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    ThoughtDelta,
    TitleDelta,
    CodeDelta,
    ToolCall,
    ToolResult,
    Log,
}

/// Log severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Explicit code fence boundary carried by every code delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "boundary", rename_all = "snake_case")]
pub enum CodeFence {
    /// Starts a new code block. Any open code block is closed first.
    Open {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Continue,
    /// Ends the current code block after appending this delta's text.
    Close,
}

/// Concrete event payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ThoughtDelta {
        text: String,
        /// Closes the current thought block.
        #[serde(default)]
        done: bool,
    },
    TitleDelta {
        text: String,
    },
    CodeDelta {
        text: String,
        fence: CodeFence,
    },
    ToolCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        #[serde(default)]
        payload: serde_json::Value,
        success: bool,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

impl EventPayload {
    pub fn thought(text: impl Into<String>) -> Self {
        Self::ThoughtDelta {
            text: text.into(),
            done: false,
        }
    }

    pub fn thought_done(text: impl Into<String>) -> Self {
        Self::ThoughtDelta {
            text: text.into(),
            done: true,
        }
    }

    pub fn title(text: impl Into<String>) -> Self {
        Self::TitleDelta { text: text.into() }
    }

    pub fn code_open(language: Option<&str>, text: impl Into<String>) -> Self {
        Self::CodeDelta {
            text: text.into(),
            fence: CodeFence::Open {
                language: language.map(str::to_string),
            },
        }
    }

    pub fn code(text: impl Into<String>) -> Self {
        Self::CodeDelta {
            text: text.into(),
            fence: CodeFence::Continue,
        }
    }

    pub fn code_close(text: impl Into<String>) -> Self {
        Self::CodeDelta {
            text: text.into(),
            fence: CodeFence::Close,
        }
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, payload: serde_json::Value, success: bool) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            payload,
            success,
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::ThoughtDelta { .. } => EventKind::ThoughtDelta,
            Self::TitleDelta { .. } => EventKind::TitleDelta,
            Self::CodeDelta { .. } => EventKind::CodeDelta,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::ToolResult { .. } => EventKind::ToolResult,
            Self::Log { .. } => EventKind::Log,
        }
    }
}

/// Envelope for a single producer event.
///
/// `seq` is per turn and starts at 1. Producers may gap or reorder it; the
/// aggregator corrects the order before anything reaches a consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(seq: u64, payload: EventPayload) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
