//! Render units: the aggregator's display-ready output.

use serde::{Deserialize, Serialize};

use crate::events::LogLevel;

/// Identity of a logical block within one turn.
pub type UnitId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    /// The block is still growing; replace the previous rendering in place.
    Update,
    /// The block is closed. Emitted exactly once per unit.
    Final,
}

/// How a tool call ended, as far as the feed knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolResolution {
    Pending,
    Succeeded { payload: serde_json::Value },
    Failed { payload: serde_json::Value },
    /// The turn ended before a result arrived.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitBody {
    Thought {
        text: String,
    },
    Title {
        text: String,
    },
    Code {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        fence_closed: bool,
    },
    ToolCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
        resolution: ToolResolution,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

/// One emission on the render feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderUnit {
    pub unit_id: UnitId,
    /// Emission order within the turn, strictly increasing.
    pub seq: u64,
    /// Corrected sequence number of the event that produced this emission.
    pub source_seq: u64,
    pub phase: UnitPhase,
    pub body: UnitBody,
}

impl RenderUnit {
    pub fn is_final(&self) -> bool {
        self.phase == UnitPhase::Final
    }
}
