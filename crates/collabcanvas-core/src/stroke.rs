//! Stroke grouping and the canonical history.
//!
//! Events are grouped into [`Stroke`] containers: one `start` followed by
//! its `draw` samples for freehand tools, or a single event for shapes,
//! text and images. Strokes are appended in the order the server observes
//! their first event, so walking strokes then their events yields the
//! chronological history that clients replay.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{Event, EventKind, SequencedEvent, Tool};
use crate::undo::UndoRedoStack;

/// What a stroke container was drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeTool {
    Brush,
    Eraser,
    Shape,
    Text,
    Image,
}

impl StrokeTool {
    fn of(event: &Event) -> Self {
        match event {
            Event::Start(p) | Event::Draw(p) => match p.tool {
                Tool::Brush => StrokeTool::Brush,
                Tool::Eraser => StrokeTool::Eraser,
            },
            Event::Shape(_) => StrokeTool::Shape,
            Event::Text(_) => StrokeTool::Text,
            Event::Image(_) => StrokeTool::Image,
        }
    }
}

/// An ordered group of events forming one drawing action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// The originating stroke id, or a generated id for atomic containers.
    pub id: String,
    /// Sequence of the defining (first) event.
    pub seq: Option<u64>,
    pub tool: StrokeTool,
    pub color: Option<String>,
    pub width: Option<f64>,
    events: Vec<SequencedEvent>,
}

impl Stroke {
    /// Open a container whose style comes from its first event.
    pub fn from_event(id: String, event: SequencedEvent) -> Self {
        Self {
            id,
            seq: event.seq,
            tool: StrokeTool::of(&event.event),
            color: event.event.color().map(str::to_string),
            width: event.event.width(),
            events: vec![event],
        }
    }

    /// Events in arrival order.
    pub fn events(&self) -> &[SequencedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn push(&mut self, event: SequencedEvent) {
        self.events.push(event);
    }
}

/// How [`StrokeStore::append`] handled an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new stroke container was opened.
    Started { id: String },
    /// The event was added to an existing stroke.
    Extended { id: String },
    /// A `draw` for an unknown stroke became its own container.
    Recovered { id: String },
    /// The event was malformed and ignored.
    Rejected,
}

/// Owner of the history log and the redo stack.
#[derive(Debug, Default)]
pub struct StrokeStore {
    stacks: UndoRedoStack,
}

impl StrokeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group an event into the history.
    ///
    /// `start`, `shape`, `text` and `image` open a new container and clear
    /// redo. A `draw` extends the most recent stroke with its id, or becomes
    /// a single-event container if that stroke is not in history. A `draw`
    /// without a stroke id is rejected.
    pub fn append(&mut self, event: SequencedEvent) -> AppendOutcome {
        match event.kind() {
            EventKind::Draw => {
                let Some(id) = event.stroke_id().map(str::to_string) else {
                    log::warn!("ignoring draw without strokeId");
                    return AppendOutcome::Rejected;
                };
                if let Some(stroke) = self.stacks.latest_mut(&id) {
                    stroke.push(event);
                    return AppendOutcome::Extended { id };
                }
                log::warn!("draw for unknown stroke {id}, synthesizing a container");
                self.stacks
                    .record_recovered(Stroke::from_event(id.clone(), event));
                AppendOutcome::Recovered { id }
            }
            EventKind::Start => {
                let id = event
                    .stroke_id()
                    .map(str::to_string)
                    .unwrap_or_else(generate_id);
                self.stacks.record(Stroke::from_event(id.clone(), event));
                AppendOutcome::Started { id }
            }
            EventKind::Shape | EventKind::Text | EventKind::Image => {
                let id = generate_id();
                self.stacks.record(Stroke::from_event(id.clone(), event));
                AppendOutcome::Started { id }
            }
        }
    }

    /// All events, stroke by stroke, in chronological order.
    ///
    /// The iterator borrows the store and can be cloned to restart it.
    pub fn flatten(&self) -> impl Iterator<Item = &SequencedEvent> + Clone + '_ {
        self.stacks
            .history()
            .iter()
            .flat_map(|stroke| stroke.events().iter())
    }

    /// Owned copy of [`flatten`](Self::flatten) for sending.
    pub fn snapshot(&self) -> Vec<SequencedEvent> {
        self.flatten().cloned().collect()
    }

    /// Remove the most recent stroke. Returns false if history was empty.
    pub fn undo(&mut self) -> bool {
        self.stacks.undo()
    }

    /// Restore the most recently undone stroke. Returns false if none.
    pub fn redo(&mut self) -> bool {
        self.stacks.redo()
    }

    /// Drop all history and redo state.
    pub fn clear(&mut self) {
        self.stacks.clear();
    }

    /// Strokes in chronological order.
    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> + '_ {
        self.stacks.history().iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.history().is_empty()
    }

    pub fn redo_len(&self) -> usize {
        self.stacks.redo_stack().len()
    }

    pub fn stacks(&self) -> &UndoRedoStack {
        &self.stacks
    }
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
