//! The agent producer boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TurnError};
use crate::events::{Event, EventPayload};
use crate::response::Response;
use crate::types::{StateBlob, TurnId};

/// What a producer is asked to do for one turn.
#[derive(Debug, Clone)]
pub struct ProducerRequest {
    pub turn_id: TurnId,
    pub prompt: String,
    /// State committed by the last successful turn (or the initial state).
    pub prior_state: StateBlob,
}

/// A producer's successful result: the response and its post-turn state.
#[derive(Debug, Clone)]
pub struct ProducerOutcome {
    pub response: Response,
    pub state: StateBlob,
}

impl ProducerOutcome {
    pub fn new(response: impl Into<Response>, state: StateBlob) -> Self {
        Self {
            response: response.into(),
            state,
        }
    }
}

/// An agent that executes turns.
///
/// Implementations should stop promptly once `cancel` fires. Whatever they
/// return after that is ignored.
#[async_trait]
pub trait AgentProducer: Send + Sync {
    async fn run(
        &self,
        request: ProducerRequest,
        events: EventSender,
        cancel: CancellationToken,
    ) -> Result<ProducerOutcome>;
}

/// Backpressured event sink handed to a producer.
///
/// Sends wait while the relay's buffer is full. Once the relay is gone
/// every send fails with [`TurnError::RelayClosed`].
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    next_seq: Arc<AtomicU64>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::Sender<Event>) -> Self {
        Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Send a payload under the next sequence number and return that number.
    pub async fn emit(&self, payload: EventPayload) -> Result<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(Event::new(seq, payload))
            .await
            .map_err(|_| TurnError::RelayClosed)?;
        Ok(seq)
    }

    /// Send an event numbered by the producer.
    pub async fn send(&self, event: Event) -> Result<()> {
        self.next_seq.fetch_max(event.seq + 1, Ordering::SeqCst);
        self.tx
            .send(event)
            .await
            .map_err(|_| TurnError::RelayClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
