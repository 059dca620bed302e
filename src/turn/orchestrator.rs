//! Turn orchestrator: one active turn per session, relayed through the
//! aggregator, committed to history on success.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::aggregator::{Aggregator, RenderUnit};
use crate::config::OrchestratorConfig;
use crate::error::{Result, TurnError};
use crate::events::Event;
use crate::history::{HistoryStore, RevertTarget};
use crate::types::{Snapshot, Turn, TurnId, TurnSummary};

use super::handle::{TurnControl, TurnFeed, TurnHandle, TurnOutcome};
use super::producer::{AgentProducer, EventSender, ProducerOutcome, ProducerRequest};

#[derive(Debug)]
struct ActiveTurn {
    turn_id: TurnId,
    control: Arc<TurnControl>,
}

/// Drives turns for one session.
#[derive(Clone)]
pub struct Orchestrator {
    history: Arc<HistoryStore>,
    producer: Arc<dyn AgentProducer>,
    config: OrchestratorConfig,
    active: Arc<Mutex<Option<ActiveTurn>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("history", &self.history)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        history: Arc<HistoryStore>,
        producer: Arc<dyn AgentProducer>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            history,
            producer,
            config,
            active: Arc::new(Mutex::new(None)),
        })
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn active_turn(&self) -> Option<TurnId> {
        self.active.lock().await.as_ref().map(|active| active.turn_id)
    }

    /// Start a turn from the current committed state.
    ///
    /// Fails with [`TurnError::Conflict`] while another turn is active.
    pub async fn start_turn(&self, prompt: impl Into<String>) -> Result<TurnHandle> {
        let prompt = prompt.into();
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(TurnError::conflict(format!(
                "turn {} is still active",
                current.turn_id
            )));
        }

        let turn_id = self.history.allocate_turn_id();
        let prior_state = self.history.current_state().await;
        let control = Arc::new(TurnControl::new());
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer);
        let (feed_tx, feed_rx) = mpsc::channel(self.config.feed_buffer);

        let request = ProducerRequest {
            turn_id,
            prompt: prompt.clone(),
            prior_state,
        };
        let producer = Arc::clone(&self.producer);
        let sender = EventSender::new(event_tx);
        let token = control.token().clone();
        let producer_task =
            tokio::spawn(async move { producer.run(request, sender, token).await });

        let driver = TurnDriver {
            turn: Turn::new(turn_id, prompt),
            aggregator: Aggregator::new(self.config.reorder_window)
                .with_updates(self.config.stream_updates),
            events: event_rx,
            producer: producer_task,
            feed: feed_tx,
            feed_open: true,
            control: Arc::clone(&control),
            deadline: self.config.turn_timeout().map(|budget| Instant::now() + budget),
            timeout_ms: self.config.turn_timeout_ms.unwrap_or_default(),
            history: Arc::clone(&self.history),
            active: Arc::clone(&self.active),
            retain_failed_turns: self.config.retain_failed_turns,
        };
        *active = Some(ActiveTurn {
            turn_id,
            control: Arc::clone(&control),
        });
        drop(active);

        tracing::debug!(
            session_id = %self.history.session_id(),
            turn_id,
            "turn started"
        );
        tokio::spawn(driver.run());
        Ok(TurnHandle::new(turn_id, feed_rx, control))
    }

    /// Cancel the active turn. Returns `false` if there is none or it has
    /// already settled.
    pub async fn cancel(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(active) => active.control.request_cancel(),
            None => false,
        }
    }

    /// Truncate history after `target` and reset working state to it.
    ///
    /// Fails with [`TurnError::Conflict`] while a turn is active.
    pub async fn revert(&self, target: impl Into<RevertTarget>) -> Result<Vec<TurnSummary>> {
        let active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(TurnError::conflict(format!(
                "cannot revert while turn {} is active",
                current.turn_id
            )));
        }
        self.history.revert(target.into()).await
    }
}

enum Ending {
    Cancelled,
    Failed(TurnError),
}

/// Per-turn relay task: raw events in, render units out, then commit.
struct TurnDriver {
    turn: Turn,
    aggregator: Aggregator,
    events: mpsc::Receiver<Event>,
    producer: JoinHandle<Result<ProducerOutcome>>,
    feed: mpsc::Sender<TurnFeed>,
    feed_open: bool,
    control: Arc<TurnControl>,
    deadline: Option<Instant>,
    timeout_ms: u64,
    history: Arc<HistoryStore>,
    active: Arc<Mutex<Option<ActiveTurn>>>,
    retain_failed_turns: bool,
}

impl TurnDriver {
    async fn run(mut self) {
        let outcome = match self.relay().await {
            Ok(produced) => self.settle(produced).await,
            Err(ending) => self.abandon(ending).await,
        };
        self.release().await;
        tracing::debug!(
            turn_id = self.turn.id,
            completed = outcome.is_completed(),
            events = self.aggregator.events().len(),
            "turn finished"
        );
        if self.feed.send(TurnFeed::Finished(outcome)).await.is_err() {
            tracing::debug!(turn_id = self.turn.id, "turn handle dropped before outcome");
        }
    }

    async fn relay(&mut self) -> std::result::Result<ProducerOutcome, Ending> {
        // The producer may hand its sender to helpers that outlive `run`, so
        // the join handle, not channel closure, marks the end of the turn.
        let mut events_open = true;
        let joined = loop {
            tokio::select! {
                biased;
                _ = self.control.token().cancelled() => return Err(Ending::Cancelled),
                _ = until(self.deadline) => return Err(self.timed_out()),
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.accept(event).await?,
                    None => events_open = false,
                },
                joined = &mut self.producer => break joined,
            }
        };

        while let Ok(event) = self.events.try_recv() {
            self.accept(event).await?;
        }

        let failure = match joined {
            Ok(Ok(produced)) => return Ok(produced),
            Ok(Err(err @ TurnError::Execution(_))) => err,
            Ok(Err(other)) => TurnError::execution(other.to_string()),
            Err(join_err) => {
                TurnError::execution(format!("producer task ended abnormally: {join_err}"))
            }
        };
        tracing::debug!(turn_id = self.turn.id, error = %failure, "producer failed");
        // The producer ended on its own, so open runs close as they would on success.
        self.close_runs().await?;
        Err(Ending::Failed(failure))
    }

    async fn close_runs(&mut self) -> std::result::Result<(), Ending> {
        let units = self.aggregator.finish().map_err(Ending::Failed)?;
        self.forward(units).await
    }

    async fn accept(&mut self, event: Event) -> std::result::Result<(), Ending> {
        self.turn.mark_streaming();
        let units = self.aggregator.push(event).map_err(Ending::Failed)?;
        self.forward(units).await
    }

    async fn forward(&mut self, units: Vec<RenderUnit>) -> std::result::Result<(), Ending> {
        for unit in units {
            if !self.feed_open {
                continue;
            }
            tokio::select! {
                biased;
                _ = self.control.token().cancelled() => return Err(Ending::Cancelled),
                _ = until(self.deadline) => return Err(self.timed_out()),
                sent = self.feed.send(TurnFeed::Unit(unit)) => {
                    if sent.is_err() {
                        tracing::debug!(turn_id = self.turn.id, "turn handle dropped, continuing unobserved");
                        self.feed_open = false;
                    }
                }
            }
        }
        Ok(())
    }

    async fn settle(&mut self, produced: ProducerOutcome) -> TurnOutcome {
        if let Err(ending) = self.close_runs().await {
            return self.abandon(ending).await;
        }
        if let Err(err) = produced.response.validate() {
            return self.abandon(Ending::Failed(err)).await;
        }
        if !self.control.settle() {
            return self.abandon(Ending::Cancelled).await;
        }

        let turn = self
            .turn
            .clone()
            .complete(self.aggregator.events().to_vec(), produced.response.clone());
        let snapshot = Snapshot::new(turn.id, produced.state);
        match self.history.append(turn, Some(snapshot)).await {
            Ok(()) => TurnOutcome::Completed {
                response: produced.response,
            },
            Err(err) => {
                tracing::warn!(turn_id = self.turn.id, error = %err, "snapshot commit failed");
                self.abandon(Ending::Failed(err)).await
            }
        }
    }

    async fn abandon(&mut self, ending: Ending) -> TurnOutcome {
        self.control.settle();
        self.control.token().cancel();

        let events = self.aggregator.events().to_vec();
        let (turn, outcome) = match ending {
            Ending::Cancelled => (self.turn.clone().cancel(events), TurnOutcome::Cancelled),
            Ending::Failed(err) => {
                tracing::debug!(turn_id = self.turn.id, error = %err, "turn failed");
                (
                    self.turn
                        .clone()
                        .fail(events, err.failure_kind(), err.to_string()),
                    TurnOutcome::Failed { error: err },
                )
            }
        };

        if self.retain_failed_turns {
            if let Err(err) = self.history.append(turn, None).await {
                tracing::warn!(turn_id = self.turn.id, error = %err, "failed to record audit entry");
            }
        }
        outcome
    }

    fn timed_out(&self) -> Ending {
        tracing::debug!(turn_id = self.turn.id, timeout_ms = self.timeout_ms, "turn timed out");
        Ending::Failed(TurnError::Timeout(self.timeout_ms))
    }

    async fn release(&self) {
        let mut active = self.active.lock().await;
        if active
            .as_ref()
            .is_some_and(|current| current.turn_id == self.turn.id)
        {
            *active = None;
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
