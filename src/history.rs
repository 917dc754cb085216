use std::collections::VecDeque;

use crate::error::Error;
use crate::model::EditState;

/// Full copy of everything an undo step has to bring back.
#[derive(Clone, Debug, PartialEq)]
pub struct EditSnapshot {
    pub document: Vec<u8>,
    pub state: EditState,
}

/// Bounded undo/redo over full snapshots. The last entry of the undo stack
/// is always the current state; the first committed snapshot is the
/// session's starting point and is never popped.
#[derive(Debug)]
pub struct EditHistory {
    undo: VecDeque<EditSnapshot>,
    redo: Vec<EditSnapshot>,
    depth: usize,
}

impl EditHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn can_undo(&self) -> bool {
        self.undo.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn current(&self) -> Option<&EditSnapshot> {
        self.undo.back()
    }

    fn push_bounded(&mut self, snapshot: EditSnapshot) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    /// Records a new current state and clears redo.
    pub fn commit(&mut self, snapshot: EditSnapshot) {
        self.push_bounded(snapshot);
        self.redo.clear();
    }

    /// Restores the previous state through `restore`. Returns `Ok(false)`
    /// without touching anything when there is nothing to undo; a failing
    /// `restore` leaves both stacks as they were.
    pub fn undo<F>(&mut self, restore: F) -> Result<bool, Error>
    where
        F: FnOnce(&EditSnapshot) -> Result<(), Error>,
    {
        if !self.can_undo() {
            return Ok(false);
        }
        let Some(previous) = self.undo.len().checked_sub(2).and_then(|i| self.undo.get(i)) else {
            return Ok(false);
        };
        restore(previous)?;
        if let Some(current) = self.undo.pop_back() {
            self.redo.push(current);
        }
        Ok(true)
    }

    /// Restores the most recently undone state and makes it current again.
    pub fn redo<F>(&mut self, restore: F) -> Result<bool, Error>
    where
        F: FnOnce(&EditSnapshot) -> Result<(), Error>,
    {
        let Some(next) = self.redo.last() else {
            return Ok(false);
        };
        restore(next)?;
        if let Some(next) = self.redo.pop() {
            self.push_bounded(next);
        }
        Ok(true)
    }
}
