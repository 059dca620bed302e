//! Rebuild the consumer's view of a session from its stored log.

use serde::{Deserialize, Serialize};

use crate::aggregator::{Aggregator, RenderUnit, UnitBody};
use crate::error::FailureKind;
use crate::response::Response;
use crate::types::{Turn, TurnStatus, TurnSummary};

use super::HistoryEntry;

const ACTIVITY: &str = "Activity";

/// One stored turn as a consumer would have seen it live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedTurn {
    pub summary: TurnSummary,
    /// Finalized render units, in emission order.
    pub activity: Vec<RenderUnit>,
    pub activity_label: String,
    pub response: Option<Response>,
    /// Whether the entry carries a snapshot and so can be reverted to.
    pub revertible: bool,
}

impl ReplayedTurn {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        let activity = replay_events(&entry.turn);
        Self {
            summary: entry.turn.summary(),
            activity_label: activity_label(&activity),
            activity,
            response: entry.turn.response.clone(),
            revertible: entry.is_revert_point(),
        }
    }
}

/// Replay a turn's corrected events through a fresh aggregator and keep the
/// final units.
///
/// A failed turn may hold the event that failed it; replay stops there and
/// keeps what was finalized before it. Open runs are only closed for turns
/// whose producer ran to its end, matching what the live relay delivered.
pub fn replay_events(turn: &Turn) -> Vec<RenderUnit> {
    let mut aggregator = Aggregator::new(1).with_updates(false);
    let mut units = Vec::new();
    for event in &turn.events {
        match aggregator.push(event.clone()) {
            Ok(emitted) => units.extend(emitted),
            Err(err) => {
                tracing::debug!(turn_id = turn.id, seq = event.seq, error = %err, "replay stopped at failing event");
                break;
            }
        }
    }
    if !closes_runs_at_end(&turn.status) {
        return units;
    }
    match aggregator.finish() {
        Ok(emitted) => units.extend(emitted),
        Err(err) => tracing::debug!(turn_id = turn.id, error = %err, "replay finish failed"),
    }
    units
}

/// Cancelled, timed-out and protocol-failed turns stop relaying where they
/// are, so their open runs never reach a final unit.
fn closes_runs_at_end(status: &TurnStatus) -> bool {
    match status {
        TurnStatus::Completed => true,
        TurnStatus::Failed { reason } => matches!(
            reason,
            FailureKind::Execution | FailureKind::Validation | FailureKind::Storage
        ),
        TurnStatus::Pending | TurnStatus::Streaming | TurnStatus::Cancelled => false,
    }
}

/// `Activity`, or `Activity — <title>` using the last non-empty title.
pub fn activity_label(units: &[RenderUnit]) -> String {
    let title = units.iter().rev().find_map(|unit| match &unit.body {
        UnitBody::Title { text } if !text.trim().is_empty() => Some(text.trim()),
        _ => None,
    });
    match title {
        Some(title) => format!("{ACTIVITY} — {title}"),
        None => ACTIVITY.to_string(),
    }
}
