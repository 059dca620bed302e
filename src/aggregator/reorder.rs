//! Bounded ordering buffer for producer sequence numbers.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::error::{Result, TurnError};
use crate::events::Event;

/// Releases events in producer sequence order.
///
/// Holds at most `window` events while waiting for a missing number. When
/// the buffer overflows, the gap is skipped and the numbers in it are
/// remembered, so a straggler from a skipped gap is reported instead of
/// being spliced in out of order.
#[derive(Debug)]
pub struct ReorderBuffer {
    window: usize,
    high: u64,
    pending: BTreeMap<u64, Event>,
    skipped: Vec<RangeInclusive<u64>>,
}

impl ReorderBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            high: 0,
            pending: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Highest producer sequence number released so far.
    pub fn high_water(&self) -> u64 {
        self.high
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Accept one event and return whatever became releasable, in order.
    pub fn push(&mut self, event: Event) -> Result<Vec<Event>> {
        let seq = event.seq;
        if seq == 0 {
            return Err(TurnError::protocol("event sequence numbers start at 1"));
        }
        if seq <= self.high {
            if self.was_skipped(seq) {
                return Err(TurnError::protocol(format!(
                    "event {seq} arrived after its gap was skipped (reorder window {})",
                    self.window
                )));
            }
            tracing::warn!(seq, high = self.high, "dropping duplicate event");
            return Ok(Vec::new());
        }
        if self.pending.contains_key(&seq) {
            tracing::warn!(seq, "dropping duplicate buffered event");
            return Ok(Vec::new());
        }

        self.pending.insert(seq, event);
        let mut released = self.drain_ready();
        while self.pending.len() > self.window {
            released.extend(self.skip_gap());
        }
        Ok(released)
    }

    /// Release everything still buffered, skipping any gaps.
    pub fn flush(&mut self) -> Vec<Event> {
        let mut released = self.drain_ready();
        while !self.pending.is_empty() {
            released.extend(self.skip_gap());
        }
        released
    }

    fn drain_ready(&mut self) -> Vec<Event> {
        let mut released = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.high + 1 {
                break;
            }
            let event = entry.remove();
            self.high = event.seq;
            released.push(event);
        }
        released
    }

    fn skip_gap(&mut self) -> Vec<Event> {
        let Some(&lowest) = self.pending.keys().next() else {
            return Vec::new();
        };
        if lowest > self.high + 1 {
            let gap = (self.high + 1)..=(lowest - 1);
            tracing::warn!(
                from = gap.start(),
                to = gap.end(),
                "skipping sequence gap"
            );
            self.skipped.push(gap);
        }
        self.high = lowest - 1;
        self.drain_ready()
    }

    fn was_skipped(&self, seq: u64) -> bool {
        self.skipped.iter().any(|range| range.contains(&seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPayload;

    fn ev(seq: u64) -> Event {
        Event::new(seq, EventPayload::thought(seq.to_string()))
    }

    fn seqs(events: &[Event]) -> Vec<u64> {
        events.iter().map(|e| e.seq).collect()
    }

    #[test]
    fn in_order_events_pass_straight_through() {
        let mut buffer = ReorderBuffer::new(4);
        assert_eq!(seqs(&buffer.push(ev(1)).unwrap()), vec![1]);
        assert_eq!(seqs(&buffer.push(ev(2)).unwrap()), vec![2]);
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn swapped_events_are_reordered() {
        let mut buffer = ReorderBuffer::new(4);
        assert!(buffer.push(ev(2)).unwrap().is_empty());
        assert_eq!(seqs(&buffer.push(ev(1)).unwrap()), vec![1, 2]);
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut buffer = ReorderBuffer::new(4);
        buffer.push(ev(1)).unwrap();
        assert!(buffer.push(ev(1)).unwrap().is_empty());
        buffer.push(ev(3)).unwrap();
        assert!(buffer.push(ev(3)).unwrap().is_empty());
        assert_eq!(buffer.buffered(), 1);
    }

    #[test]
    fn overflow_skips_the_gap() {
        let mut buffer = ReorderBuffer::new(2);
        buffer.push(ev(1)).unwrap();
        assert!(buffer.push(ev(3)).unwrap().is_empty());
        assert!(buffer.push(ev(4)).unwrap().is_empty());
        assert_eq!(seqs(&buffer.push(ev(5)).unwrap()), vec![3, 4, 5]);
        assert_eq!(buffer.high_water(), 5);
    }

    #[test]
    fn straggler_from_skipped_gap_is_a_protocol_error() {
        let mut buffer = ReorderBuffer::new(1);
        buffer.push(ev(1)).unwrap();
        buffer.push(ev(3)).unwrap();
        buffer.push(ev(4)).unwrap();
        let err = buffer.push(ev(2)).unwrap_err();
        assert!(matches!(err, TurnError::Protocol(_)));
    }

    #[test]
    fn flush_releases_across_gaps() {
        let mut buffer = ReorderBuffer::new(8);
        buffer.push(ev(2)).unwrap();
        buffer.push(ev(5)).unwrap();
        assert_eq!(seqs(&buffer.flush()), vec![2, 5]);
    }

    #[test]
    fn zero_sequence_is_rejected() {
        let mut buffer = ReorderBuffer::new(4);
        assert!(matches!(buffer.push(ev(0)), Err(TurnError::Protocol(_))));
    }
}
