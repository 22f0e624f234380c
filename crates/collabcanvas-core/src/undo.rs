//! Global linear undo/redo over whole strokes.

use crate::stroke::Stroke;

/// A LIFO stack. Iteration runs bottom to top (oldest first).
#[derive(Debug, Clone)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Top of the stack.
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// History and redo stacks of strokes.
///
/// The history stack is the canonical history log: its bottom is the oldest
/// stroke and its top the most recent. Undo and redo move whole strokes
/// between the two stacks and apply to every participant alike.
#[derive(Debug, Default)]
pub struct UndoRedoStack {
    history: Stack<Stroke>,
    redo: Stack<Stroke>,
}

impl UndoRedoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stroke created by a new user action. Invalidates redo.
    pub fn record(&mut self, stroke: Stroke) {
        self.history.push(stroke);
        self.redo.clear();
    }

    /// Append a stroke synthesized while recovering a stray `draw`. Leaves
    /// redo untouched since no new action was started.
    pub fn record_recovered(&mut self, stroke: Stroke) {
        self.history.push(stroke);
    }

    /// Move the most recent stroke onto the redo stack.
    /// Returns true if undo was performed, false if history was empty.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(stroke) => {
                log::debug!("undo stroke {}", stroke.id);
                self.redo.push(stroke);
                true
            }
            None => false,
        }
    }

    /// Re-append the most recently undone stroke.
    /// Returns true if redo was performed, false if nothing was undone.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(stroke) => {
                log::debug!("redo stroke {}", stroke.id);
                self.history.push(stroke);
                true
            }
            None => false,
        }
    }

    /// Empty both stacks.
    pub fn clear(&mut self) {
        self.history.clear();
        self.redo.clear();
    }

    pub fn history(&self) -> &Stack<Stroke> {
        &self.history
    }

    pub fn redo_stack(&self) -> &Stack<Stroke> {
        &self.redo
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Most recent stroke in history with the given id.
    pub(crate) fn latest_mut(&mut self, id: &str) -> Option<&mut Stroke> {
        self.history.iter_mut().rev().find(|stroke| stroke.id == id)
    }
}
