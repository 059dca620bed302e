//! Turn execution: producer boundary, orchestrator, consumer handle.

pub mod handle;
pub mod orchestrator;
pub mod producer;

pub use handle::{TurnFeed, TurnHandle, TurnOutcome};
pub use orchestrator::Orchestrator;
pub use producer::{AgentProducer, EventSender, ProducerOutcome, ProducerRequest};
