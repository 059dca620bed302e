//! Convenience re-exports for common use.

pub use crate::aggregator::{Aggregator, RenderUnit, ToolResolution, UnitBody, UnitPhase};
pub use crate::config::OrchestratorConfig;
pub use crate::error::{Result, TurnError};
pub use crate::events::{CodeFence, Event, EventPayload, LogLevel};
pub use crate::history::{
    FileBacking, HistoryBacking, HistoryStore, MemoryBacking, ReplayedTurn, RevertTarget,
};
pub use crate::response::{Cell, Chart, Response, ResponsePart, Table};
pub use crate::turn::{
    AgentProducer, EventSender, Orchestrator, ProducerOutcome, ProducerRequest, TurnFeed,
    TurnHandle, TurnOutcome,
};
pub use crate::types::{SessionId, Snapshot, StateBlob, Turn, TurnId, TurnStatus};
