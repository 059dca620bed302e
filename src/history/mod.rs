//! Versioned, revertable history of a session's turns.

pub mod backing;
pub mod replay;

pub use backing::{FileBacking, HistoryBacking, HistoryEntry, MemoryBacking};
pub use replay::{activity_label, replay_events, ReplayedTurn};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, TurnError};
use crate::types::{SessionId, Snapshot, StateBlob, Turn, TurnId, TurnStatus, TurnSummary};

/// Where a revert lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertTarget {
    /// Discard every turn and go back to the session's initial state.
    BeforeFirst,
    /// Keep this turn and everything before it.
    Turn(TurnId),
}

impl From<TurnId> for RevertTarget {
    fn from(value: TurnId) -> Self {
        Self::Turn(value)
    }
}

/// The history log for one session.
///
/// Every mutation writes through the backing before the in-memory view
/// changes, under the write lock, so readers never see a partial update.
pub struct HistoryStore {
    session: SessionId,
    initial_state: StateBlob,
    backing: Arc<dyn HistoryBacking>,
    entries: RwLock<Vec<HistoryEntry>>,
    next_turn_id: AtomicU64,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("session", &self.session)
            .field("next_turn_id", &self.next_turn_id.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Open a session's history, loading whatever the backing holds.
    pub async fn open(
        session: SessionId,
        initial_state: StateBlob,
        backing: Arc<dyn HistoryBacking>,
    ) -> Result<Self> {
        let entries = backing.load(&session).await?;
        let next = entries.iter().map(HistoryEntry::turn_id).max().unwrap_or(0) + 1;
        tracing::debug!(session_id = %session, entries = entries.len(), next_turn_id = next, "history opened");
        Ok(Self {
            session,
            initial_state,
            backing,
            entries: RwLock::new(entries),
            next_turn_id: AtomicU64::new(next),
        })
    }

    /// In-memory history with an empty initial state.
    pub async fn in_memory(session: SessionId) -> Result<Self> {
        Self::open(session, StateBlob::empty(), Arc::new(MemoryBacking::new())).await
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn initial_state(&self) -> &StateBlob {
        &self.initial_state
    }

    /// Reserve the next turn id. Ids never move backwards, even across reverts.
    pub fn allocate_turn_id(&self) -> TurnId {
        self.next_turn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Append a terminal turn.
    ///
    /// A completed turn must carry exactly one snapshot for its own id; any
    /// other status must carry none.
    pub async fn append(&self, turn: Turn, snapshot: Option<Snapshot>) -> Result<()> {
        if !turn.status.is_terminal() {
            return Err(TurnError::validation(format!(
                "turn {} is {} and cannot be recorded",
                turn.id, turn.status
            )));
        }
        match (&turn.status, &snapshot) {
            (TurnStatus::Completed, Some(snapshot)) if snapshot.turn_id != turn.id => {
                return Err(TurnError::validation(format!(
                    "snapshot for turn {} attached to turn {}",
                    snapshot.turn_id, turn.id
                )));
            }
            (TurnStatus::Completed, None) => {
                return Err(TurnError::validation(format!(
                    "completed turn {} has no snapshot",
                    turn.id
                )));
            }
            (status, Some(_)) if *status != TurnStatus::Completed => {
                return Err(TurnError::validation(format!(
                    "{status} turn {} cannot carry a snapshot",
                    turn.id
                )));
            }
            _ => {}
        }

        let mut entries = self.entries.write().await;
        if let Some(last) = entries.last() {
            if turn.id <= last.turn_id() {
                return Err(TurnError::validation(format!(
                    "turn id {} does not follow {}",
                    turn.id,
                    last.turn_id()
                )));
            }
        }

        let entry = HistoryEntry::new(turn, snapshot);
        self.backing.append(&self.session, &entry).await?;
        self.next_turn_id
            .fetch_max(entry.turn_id() + 1, Ordering::SeqCst);
        tracing::info!(
            session_id = %self.session,
            turn_id = entry.turn_id(),
            status = %entry.turn.status,
            snapshot = entry.is_revert_point(),
            "turn recorded"
        );
        entries.push(entry);
        Ok(())
    }

    /// Ordered turn summaries with their snapshots.
    pub async fn list(&self) -> Vec<(TurnSummary, Option<Snapshot>)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|entry| (entry.turn.summary(), entry.snapshot.clone()))
            .collect()
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Truncate the log after `target` and return what remains.
    ///
    /// Reverting to the same target twice is a no-op the second time.
    pub async fn revert(&self, target: RevertTarget) -> Result<Vec<TurnSummary>> {
        let mut entries = self.entries.write().await;
        let keep = match target {
            RevertTarget::BeforeFirst => 0,
            RevertTarget::Turn(turn_id) => entries
                .iter()
                .position(|entry| entry.turn_id() == turn_id && entry.is_revert_point())
                .map(|index| index + 1)
                .ok_or_else(|| TurnError::turn_not_found(turn_id))?,
        };

        let discarded = entries.len().saturating_sub(keep);
        if discarded > 0 {
            self.backing.truncate(&self.session, keep).await?;
            entries.truncate(keep);
        }
        tracing::info!(session_id = %self.session, ?target, discarded, "history reverted");
        Ok(entries.iter().map(|entry| entry.turn.summary()).collect())
    }

    /// Latest snapshot, skipping audit entries.
    pub async fn current_snapshot(&self) -> Option<Snapshot> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .find_map(|entry| entry.snapshot.clone())
    }

    /// State the next turn starts from.
    pub async fn current_state(&self) -> StateBlob {
        match self.current_snapshot().await {
            Some(snapshot) => snapshot.state,
            None => self.initial_state.clone(),
        }
    }

    /// Rebuild the consumer's view of every stored turn.
    pub async fn replay(&self) -> Vec<ReplayedTurn> {
        self.entries
            .read()
            .await
            .iter()
            .map(ReplayedTurn::from_entry)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::response::Response;
    use pretty_assertions::assert_eq;

    fn state(byte: u8) -> StateBlob {
        StateBlob::new(vec![byte])
    }

    async fn commit(store: &HistoryStore, byte: u8) -> TurnId {
        let id = store.allocate_turn_id();
        let turn = Turn::new(id, "q").complete(Vec::new(), Response::text("a"));
        store
            .append(turn, Some(Snapshot::new(id, state(byte))))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn current_state_follows_latest_snapshot() {
        let store = HistoryStore::open(SessionId::from("s"), state(0), Arc::new(MemoryBacking::new()))
            .await
            .unwrap();
        assert_eq!(store.current_state().await, state(0));
        commit(&store, 1).await;
        commit(&store, 2).await;
        assert_eq!(store.current_state().await, state(2));
    }

    #[tokio::test]
    async fn audit_entries_are_skipped_and_not_revertible() {
        let store = HistoryStore::in_memory(SessionId::from("s")).await.unwrap();
        let first = commit(&store, 1).await;
        let audit_id = store.allocate_turn_id();
        let audit = Turn::new(audit_id, "q").fail(Vec::new(), FailureKind::Execution, "boom");
        store.append(audit, None).await.unwrap();

        assert_eq!(store.current_state().await, state(1));
        assert!(matches!(
            store.revert(RevertTarget::Turn(audit_id)).await,
            Err(TurnError::NotFound(_))
        ));
        let remaining = store.revert(first.into()).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn revert_is_idempotent_and_ids_do_not_rewind() {
        let store = HistoryStore::in_memory(SessionId::from("s")).await.unwrap();
        let first = commit(&store, 1).await;
        commit(&store, 2).await;
        commit(&store, 3).await;

        store.revert(RevertTarget::Turn(first)).await.unwrap();
        store.revert(RevertTarget::Turn(first)).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.current_state().await, state(1));
        assert_eq!(store.allocate_turn_id(), 4);

        store.revert(RevertTarget::BeforeFirst).await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.current_state().await, StateBlob::empty());
    }

    #[tokio::test]
    async fn append_rejects_inconsistent_records() {
        let store = HistoryStore::in_memory(SessionId::from("s")).await.unwrap();

        let live = Turn::new(1, "q");
        assert!(matches!(store.append(live, None).await, Err(TurnError::Validation(_))));

        let done = Turn::new(1, "q").complete(Vec::new(), Response::text("a"));
        assert!(store.append(done.clone(), None).await.is_err());
        assert!(store
            .append(done.clone(), Some(Snapshot::new(9, state(1))))
            .await
            .is_err());

        let cancelled = Turn::new(2, "q").cancel(Vec::new());
        assert!(store
            .append(cancelled, Some(Snapshot::new(2, state(1))))
            .await
            .is_err());

        store
            .append(done.clone(), Some(Snapshot::new(1, state(1))))
            .await
            .unwrap();
        assert!(store
            .append(done, Some(Snapshot::new(1, state(1))))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn reopening_resumes_turn_ids_from_backing() {
        let backing: Arc<dyn HistoryBacking> = Arc::new(MemoryBacking::new());
        let session = SessionId::from("s");
        let store = HistoryStore::open(session.clone(), StateBlob::empty(), backing.clone())
            .await
            .unwrap();
        commit(&store, 1).await;
        commit(&store, 2).await;

        let reopened = HistoryStore::open(session, StateBlob::empty(), backing).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(reopened.allocate_turn_id(), 3);
        assert_eq!(reopened.current_state().await, state(2));
    }
}
