//! Consumer-side view of a running turn.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::aggregator::RenderUnit;
use crate::error::{Result, TurnError};
use crate::response::Response;
use crate::types::TurnId;

/// One item on a turn's feed.
#[derive(Debug)]
pub enum TurnFeed {
    Unit(RenderUnit),
    /// Always the last item.
    Finished(TurnOutcome),
}

/// Terminal outcome of a turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The response was validated and its snapshot committed.
    Completed { response: Response },
    Cancelled,
    Failed { error: TurnError },
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn into_result(self) -> Result<Response> {
        match self {
            Self::Completed { response } => Ok(response),
            Self::Cancelled => Err(TurnError::Cancelled),
            Self::Failed { error } => Err(error),
        }
    }
}

const LIVE: u8 = 0;
const CANCEL_REQUESTED: u8 = 1;
const SETTLED: u8 = 2;

/// Shared cancel/settle arbitration for one turn.
///
/// Whichever of a cancel request and the driver's settle happens first wins.
#[derive(Debug)]
pub(crate) struct TurnControl {
    token: CancellationToken,
    state: AtomicU8,
}

impl TurnControl {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            state: AtomicU8::new(LIVE),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `false` if the turn already settled or was already cancelled.
    pub(crate) fn request_cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(LIVE, CANCEL_REQUESTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.token.cancel();
        }
        won
    }

    /// Claim the turn's outcome. Returns `false` if a cancel got there first.
    pub(crate) fn settle(&self) -> bool {
        self.state
            .compare_exchange(LIVE, SETTLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Handle for an in-flight turn.
#[derive(Debug)]
pub struct TurnHandle {
    turn_id: TurnId,
    feed: mpsc::Receiver<TurnFeed>,
    control: Arc<TurnControl>,
}

impl TurnHandle {
    pub(crate) fn new(
        turn_id: TurnId,
        feed: mpsc::Receiver<TurnFeed>,
        control: Arc<TurnControl>,
    ) -> Self {
        Self {
            turn_id,
            feed,
            control,
        }
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// Next feed item, or `None` after the outcome has been taken.
    pub async fn next(&mut self) -> Option<TurnFeed> {
        self.feed.recv().await
    }

    /// Request cancellation. No-op returning `false` once the turn settled.
    pub fn cancel(&self) -> bool {
        self.control.request_cancel()
    }

    /// Drain the feed and return the terminal outcome.
    pub async fn wait(mut self) -> TurnOutcome {
        while let Some(item) = self.feed.recv().await {
            if let TurnFeed::Finished(outcome) = item {
                return outcome;
            }
        }
        TurnOutcome::Failed {
            error: TurnError::execution("turn relay ended without an outcome"),
        }
    }

    pub fn into_stream(self) -> ReceiverStream<TurnFeed> {
        ReceiverStream::new(self.feed)
    }
}
