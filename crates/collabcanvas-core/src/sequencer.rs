//! Global event sequencing.
//!
//! Every event that opens a history entry (`start`, `shape`, `text`,
//! `image`) takes the next number of a single counter starting at 1. `draw`
//! events inherit the number of their stroke's `start`, so a stroke keeps the
//! position of its first sample in the total order.

use std::collections::HashMap;

use crate::event::{Event, SequencedEvent};

/// Assigns server-authoritative sequence numbers.
#[derive(Debug, Default)]
pub struct EventSequencer {
    /// Last number handed out (0 before the first event).
    last: u64,
    /// Sequence of each started stroke, by stroke id.
    by_stroke: HashMap<String, u64>,
}

impl EventSequencer {
    /// Create a sequencer whose first number will be 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp an event with its sequence number.
    ///
    /// Never fails: a `draw` whose stroke was never started is returned with
    /// no sequence.
    pub fn stamp(&mut self, event: Event) -> SequencedEvent {
        let seq = match &event {
            Event::Draw(point) => {
                let seq = point
                    .stroke_id
                    .as_deref()
                    .and_then(|id| self.by_stroke.get(id).copied());
                if seq.is_none() {
                    log::debug!("draw for unstarted stroke {:?}", point.stroke_id);
                }
                seq
            }
            Event::Start(point) => {
                let seq = self.advance();
                if let Some(id) = &point.stroke_id {
                    self.by_stroke.insert(id.clone(), seq);
                }
                Some(seq)
            }
            Event::Shape(_) | Event::Text(_) | Event::Image(_) => Some(self.advance()),
        };
        SequencedEvent::new(event, seq)
    }

    /// Sequence previously assigned to a stroke's `start`.
    pub fn stroke_sequence(&self, stroke_id: &str) -> Option<u64> {
        self.by_stroke.get(stroke_id).copied()
    }

    /// Last number handed out.
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Drop the stroke lookup table. The counter keeps running so numbers stay
    /// unique for the life of the process.
    pub fn forget_strokes(&mut self) {
        self.by_stroke.clear();
    }

    fn advance(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}
