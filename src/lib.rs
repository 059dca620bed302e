//! turnkit: agent turn orchestration
//!
//! Runs one agent invocation at a time as a cancellable, backpressured
//! stream of render units, commits a snapshot of the agent's state after
//! each successful turn, and can replay or revert that history.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use turnkit::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl AgentProducer for Echo {
//!     async fn run(
//!         &self,
//!         request: ProducerRequest,
//!         events: EventSender,
//!         _cancel: CancellationToken,
//!     ) -> Result<ProducerOutcome> {
//!         events.emit(EventPayload::thought("echoing")).await?;
//!         Ok(ProducerOutcome::new(request.prompt.as_str(), request.prior_state))
//!     }
//! }
//!
//! # async fn example() -> turnkit::error::Result<()> {
//! let history = Arc::new(HistoryStore::in_memory(SessionId::new()).await?);
//! let orchestrator = Orchestrator::new(history, Arc::new(Echo), OrchestratorConfig::default())?;
//!
//! let mut turn = orchestrator.start_turn("hello").await?;
//! while let Some(item) = turn.next().await {
//!     match item {
//!         TurnFeed::Unit(unit) => println!("{:?}", unit.body),
//!         TurnFeed::Finished(outcome) => println!("{:?}", outcome.into_result()?),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod prelude;
pub mod response;
pub mod turn;
pub mod types;
