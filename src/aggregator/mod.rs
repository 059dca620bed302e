//! Token aggregation: raw producer events in, render units out.
//!
//! The [`Aggregator`] is single-threaded per turn. It corrects event order
//! through a bounded [`ReorderBuffer`], renumbers accepted events gap-free,
//! and folds deltas into runs that are finalized exactly once.

pub mod reorder;
pub mod run;
pub mod unit;

pub use reorder::ReorderBuffer;
pub use run::{BlockKind, OpenRun, RunState, TextRun};
pub use unit::{RenderUnit, ToolResolution, UnitBody, UnitId, UnitPhase};

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Result, TurnError};
use crate::events::{CodeFence, Event, EventPayload};

const DEFAULT_REORDER_WINDOW: usize = 32;

#[derive(Debug)]
struct PendingTool {
    unit_id: UnitId,
    call_id: String,
    name: String,
    arguments: serde_json::Value,
}

/// Folds one turn's events into render units.
#[derive(Debug)]
pub struct Aggregator {
    reorder: ReorderBuffer,
    run: TextRun,
    pending_tools: Vec<PendingTool>,
    accepted: Vec<Event>,
    next_unit_id: UnitId,
    next_emit_seq: u64,
    stream_updates: bool,
    finished: bool,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_REORDER_WINDOW)
    }
}

impl Aggregator {
    pub fn new(reorder_window: usize) -> Self {
        Self {
            reorder: ReorderBuffer::new(reorder_window),
            run: TextRun::new(),
            pending_tools: Vec::new(),
            accepted: Vec::new(),
            next_unit_id: 1,
            next_emit_seq: 1,
            stream_updates: true,
            finished: false,
        }
    }

    /// Emit in-place updates for open blocks (default) or only final units.
    pub fn with_updates(mut self, stream_updates: bool) -> Self {
        self.stream_updates = stream_updates;
        self
    }

    /// Accepted events, renumbered in corrected order.
    pub fn events(&self) -> &[Event] {
        &self.accepted
    }

    pub fn into_events(self) -> Vec<Event> {
        self.accepted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one raw event.
    pub fn push(&mut self, event: Event) -> Result<Vec<RenderUnit>> {
        if self.finished {
            return Err(TurnError::protocol(format!(
                "event {} arrived after the turn finished",
                event.seq
            )));
        }
        let released = self.reorder.push(event)?;
        let mut out = Vec::new();
        for event in released {
            self.apply(event, &mut out)?;
        }
        Ok(out)
    }

    /// Terminate the turn: release buffered events, close the open run and
    /// mark pending tool calls unresolved.
    pub fn finish(&mut self) -> Result<Vec<RenderUnit>> {
        if self.finished {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for event in self.reorder.flush() {
            self.apply(event, &mut out)?;
        }
        self.finished = true;

        let source_seq = self.corrected_seq();
        self.close_run(false, source_seq, &mut out);
        for tool in std::mem::take(&mut self.pending_tools) {
            tracing::debug!(call_id = %tool.call_id, "tool call unresolved at turn end");
            self.emit(
                tool.unit_id,
                UnitPhase::Final,
                UnitBody::ToolCall {
                    call_id: tool.call_id,
                    name: tool.name,
                    arguments: tool.arguments,
                    resolution: ToolResolution::Unresolved,
                },
                source_seq,
                &mut out,
            );
        }
        Ok(out)
    }

    fn corrected_seq(&self) -> u64 {
        self.accepted.len() as u64
    }

    fn apply(&mut self, mut event: Event, out: &mut Vec<RenderUnit>) -> Result<()> {
        event.seq = self.corrected_seq() + 1;
        let seq = event.seq;
        let payload = event.payload.clone();
        self.accepted.push(event);

        match payload {
            EventPayload::ThoughtDelta { text, done } => {
                self.extend_text(BlockKind::Thought, None, &text, seq, out);
                if done {
                    self.close_run(true, seq, out);
                }
            }
            EventPayload::TitleDelta { text } => {
                self.extend_text(BlockKind::Title, None, &text, seq, out);
            }
            EventPayload::CodeDelta { text, fence } => self.apply_code(text, fence, seq, out),
            EventPayload::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                if self.pending_tools.iter().any(|t| t.call_id == call_id) {
                    return Err(TurnError::protocol(format!(
                        "duplicate tool call id '{call_id}'"
                    )));
                }
                self.close_run(false, seq, out);
                let unit_id = self.allocate_unit();
                if self.stream_updates {
                    self.emit(
                        unit_id,
                        UnitPhase::Update,
                        UnitBody::ToolCall {
                            call_id: call_id.clone(),
                            name: name.clone(),
                            arguments: arguments.clone(),
                            resolution: ToolResolution::Pending,
                        },
                        seq,
                        out,
                    );
                }
                self.pending_tools.push(PendingTool {
                    unit_id,
                    call_id,
                    name,
                    arguments,
                });
            }
            EventPayload::ToolResult {
                call_id,
                payload,
                success,
            } => {
                let Some(index) = self.pending_tools.iter().position(|t| t.call_id == call_id)
                else {
                    return Err(TurnError::protocol(format!(
                        "tool result for unknown call id '{call_id}'"
                    )));
                };
                self.close_run(false, seq, out);
                let tool = self.pending_tools.remove(index);
                let resolution = if success {
                    ToolResolution::Succeeded { payload }
                } else {
                    ToolResolution::Failed { payload }
                };
                self.emit(
                    tool.unit_id,
                    UnitPhase::Final,
                    UnitBody::ToolCall {
                        call_id: tool.call_id,
                        name: tool.name,
                        arguments: tool.arguments,
                        resolution,
                    },
                    seq,
                    out,
                );
            }
            EventPayload::Log { level, message } => {
                self.close_run(false, seq, out);
                let unit_id = self.allocate_unit();
                self.emit(
                    unit_id,
                    UnitPhase::Final,
                    UnitBody::Log { level, message },
                    seq,
                    out,
                );
            }
        }
        Ok(())
    }

    fn apply_code(&mut self, text: String, fence: CodeFence, seq: u64, out: &mut Vec<RenderUnit>) {
        match fence {
            CodeFence::Open { language } => {
                let unit_id = self.allocate_unit();
                if let Some((previous, body)) = self.run.open(unit_id, BlockKind::Code, language) {
                    self.emit(previous, UnitPhase::Final, body, seq, out);
                }
                self.append_and_update(&text, seq, out);
            }
            CodeFence::Continue => {
                self.extend_text(BlockKind::Code, None, &text, seq, out);
            }
            CodeFence::Close => {
                if self.run.open_kind() != Some(BlockKind::Code) {
                    self.close_run(false, seq, out);
                    if text.is_empty() {
                        tracing::debug!(seq, "ignoring code fence close with no open block");
                        return;
                    }
                    let unit_id = self.allocate_unit();
                    self.run.open(unit_id, BlockKind::Code, None);
                }
                self.run.append(&text);
                self.close_run(true, seq, out);
            }
        }
    }

    fn extend_text(
        &mut self,
        kind: BlockKind,
        language: Option<String>,
        text: &str,
        seq: u64,
        out: &mut Vec<RenderUnit>,
    ) {
        if self.run.open_kind() != Some(kind) {
            let unit_id = self.allocate_unit();
            if let Some((previous, body)) = self.run.open(unit_id, kind, language) {
                self.emit(previous, UnitPhase::Final, body, seq, out);
            }
        }
        self.append_and_update(text, seq, out);
    }

    fn append_and_update(&mut self, text: &str, seq: u64, out: &mut Vec<RenderUnit>) {
        if let Some((unit_id, body)) = self.run.append(text) {
            if self.stream_updates {
                self.emit(unit_id, UnitPhase::Update, body, seq, out);
            }
        }
    }

    fn close_run(&mut self, fence_closed: bool, seq: u64, out: &mut Vec<RenderUnit>) {
        if let Some((unit_id, body)) = self.run.close(fence_closed) {
            self.emit(unit_id, UnitPhase::Final, body, seq, out);
        }
    }

    fn allocate_unit(&mut self) -> UnitId {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        id
    }

    fn emit(
        &mut self,
        unit_id: UnitId,
        phase: UnitPhase,
        body: UnitBody,
        source_seq: u64,
        out: &mut Vec<RenderUnit>,
    ) {
        let seq = self.next_emit_seq;
        self.next_emit_seq += 1;
        out.push(RenderUnit {
            unit_id,
            seq,
            source_seq,
            phase,
            body,
        });
    }
}

/// Adapt an event stream into a render-unit stream.
///
/// Ends after the aggregator's `finish` output, or right after the first
/// error.
pub fn aggregate_stream(
    mut aggregator: Aggregator,
    events: BoxStream<'static, Event>,
) -> BoxStream<'static, Result<RenderUnit>> {
    let transformed = async_stream::stream! {
        let mut inner = events;
        while let Some(event) = inner.next().await {
            match aggregator.push(event) {
                Ok(units) => {
                    for unit in units {
                        yield Ok(unit);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        match aggregator.finish() {
            Ok(units) => {
                for unit in units {
                    yield Ok(unit);
                }
            }
            Err(e) => yield Err(e),
        }
    };
    Box::pin(transformed)
}
