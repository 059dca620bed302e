//! Text run state machine (idle → open → closed).

use super::unit::{UnitBody, UnitId};

/// Block kinds that accumulate text across deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Thought,
    Title,
    Code,
}

/// The block currently accumulating text.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRun {
    pub unit_id: UnitId,
    pub kind: BlockKind,
    pub text: String,
    pub language: Option<String>,
}

impl OpenRun {
    fn body(&self, fence_closed: bool) -> UnitBody {
        match self.kind {
            BlockKind::Thought => UnitBody::Thought {
                text: self.text.clone(),
            },
            BlockKind::Title => UnitBody::Title {
                text: self.text.clone(),
            },
            BlockKind::Code => UnitBody::Code {
                text: self.text.clone(),
                language: self.language.clone(),
                fence_closed,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Open(OpenRun),
    /// The last run has been finalized; the next delta opens a new one.
    Closed { unit_id: UnitId },
}

/// One text run. At most one is open per turn at a time.
#[derive(Debug)]
pub struct TextRun {
    state: RunState,
}

impl Default for TextRun {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRun {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn open_kind(&self) -> Option<BlockKind> {
        match &self.state {
            RunState::Open(run) => Some(run.kind),
            _ => None,
        }
    }

    /// Open a new run. Returns the previous run's final body if one was
    /// still open, closed without a fence.
    pub fn open(
        &mut self,
        unit_id: UnitId,
        kind: BlockKind,
        language: Option<String>,
    ) -> Option<(UnitId, UnitBody)> {
        let previous = self.close(false);
        self.state = RunState::Open(OpenRun {
            unit_id,
            kind,
            text: String::new(),
            language,
        });
        previous
    }

    /// Append text to the open run and return its current body.
    pub fn append(&mut self, text: &str) -> Option<(UnitId, UnitBody)> {
        match &mut self.state {
            RunState::Open(run) => {
                run.text.push_str(text);
                Some((run.unit_id, run.body(false)))
            }
            _ => None,
        }
    }

    /// Finalize the open run. `fence_closed` only affects code runs.
    pub fn close(&mut self, fence_closed: bool) -> Option<(UnitId, UnitBody)> {
        let RunState::Open(run) = &self.state else {
            return None;
        };
        let unit_id = run.unit_id;
        let body = run.body(fence_closed);
        self.state = RunState::Closed { unit_id };
        Some((unit_id, body))
    }
}
