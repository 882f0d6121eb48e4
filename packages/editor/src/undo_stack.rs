//! # Undo/Redo Stack
//!
//! Tracks which local edits can be undone and redone.
//!
//! ## Design
//!
//! - The stack stores edit ids only; the edit log holds the content
//! - Undo reverts each edit of a batch, newest first, as new edits
//! - The reverting edits become the redo batch, and redo reverts them again
//! - New edits clear the redo stack
//! - Supports batched edits (group multiple edits as one undo step)
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tree = SharedTree::new(options, Box::new(NullSequencer));
//!
//! tree.submit_edit(vec![Change::set_payload(node, json!(1))])?;
//!
//! // Undo
//! tree.undo()?;
//!
//! // Redo
//! tree.redo()?;
//! ```

use arbor_common::EditId;

/// A group of edits that are undone/redone together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBatch {
    /// The edits in this batch (in application order)
    pub edits: Vec<EditId>,

    /// Optional description of this batch
    pub description: Option<String>,
}

impl EditBatch {
    /// Create a single-edit batch
    pub fn single(edit: EditId) -> Self {
        Self {
            edits: vec![edit],
            description: None,
        }
    }

    /// Add a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Undo/redo stack for one replica's local edits
#[derive(Debug)]
pub struct UndoStack {
    /// Stack of applied batches (most recent last)
    undo_stack: Vec<EditBatch>,

    /// Stack of undone batches (most recent last)
    redo_stack: Vec<EditBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Currently building a batch
    current_batch: Option<EditBatch>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    /// Create an undo stack with custom max levels
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Record a newly committed edit
    pub fn record(&mut self, edit: EditId) {
        if let Some(batch) = &mut self.current_batch {
            batch.edits.push(edit);
        } else {
            self.push_batch(EditBatch::single(edit));
            self.redo_stack.clear();
        }
    }

    /// Start a batch of edits (will be undone/redone together)
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(EditBatch {
            edits: Vec::new(),
            description: None,
        });
    }

    /// End the current batch and push to undo stack
    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.edits.is_empty() {
                self.push_batch(batch);
                self.redo_stack.clear();
            }
        }
    }

    /// Set description for current batch (if batching)
    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    fn push_batch(&mut self, batch: EditBatch) {
        self.undo_stack.push(batch);

        // Trim if exceeded max levels
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
    }

    /// Take the most recent batch to undo
    pub fn take_undo(&mut self) -> Option<EditBatch> {
        self.undo_stack.pop()
    }

    /// Take the most recently undone batch to redo
    pub fn take_redo(&mut self) -> Option<EditBatch> {
        self.redo_stack.pop()
    }

    /// Record the edits that undid a batch
    pub fn push_undone(&mut self, batch: EditBatch) {
        self.redo_stack.push(batch);
    }

    /// Record the edits that redid a batch; keeps the rest of the redo stack
    pub fn push_redone(&mut self, batch: EditBatch) {
        self.push_batch(batch);
    }

    /// Put back a batch taken with `take_undo` that could not be undone
    pub fn restore_undo(&mut self, batch: EditBatch) {
        self.undo_stack.push(batch);
    }

    /// Put back a batch taken with `take_redo` that could not be redone
    pub fn restore_redo(&mut self, batch: EditBatch) {
        self.redo_stack.push(batch);
    }

    /// Forget an edit that no longer exists
    pub fn forget(&mut self, edit: EditId) {
        for stack in [&mut self.undo_stack, &mut self.redo_stack] {
            for batch in stack.iter_mut() {
                batch.edits.retain(|e| *e != edit);
            }
            stack.retain(|batch| !batch.edits.is_empty());
        }
        if let Some(batch) = &mut self.current_batch {
            batch.edits.retain(|e| *e != edit);
        }
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    /// Get description of the next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    /// Get description of the next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> EditId {
        EditId::from_u128(n)
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_record_and_take() {
        let mut stack = UndoStack::new();
        stack.record(id(1));
        assert!(stack.can_undo());

        let batch = stack.take_undo().unwrap();
        assert_eq!(batch.edits, vec![id(1)]);
        stack.push_undone(EditBatch::single(id(2)));
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 1);

        let redo = stack.take_redo().unwrap();
        assert_eq!(redo.edits, vec![id(2)]);
        stack.push_redone(EditBatch::single(id(3)));
        assert_eq!(stack.undo_levels(), 1);
    }

    #[test]
    fn test_batched_edits() {
        let mut stack = UndoStack::new();
        stack.begin_batch();
        stack.set_batch_description("Rename items");
        stack.record(id(1));
        stack.record(id(2));
        stack.end_batch();

        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.undo_description(), Some("Rename items"));
        assert_eq!(stack.take_undo().unwrap().edits, vec![id(1), id(2)]);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut stack = UndoStack::new();
        stack.record(id(1));
        stack.take_undo();
        stack.push_undone(EditBatch::single(id(2)).with_description("undo"));
        assert_eq!(stack.redo_description(), Some("undo"));

        stack.record(id(3));
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut stack = UndoStack::with_max_levels(2);
        for n in 0..3 {
            stack.record(id(n));
        }
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_restore_keeps_both_stacks() {
        let mut stack = UndoStack::new();
        stack.record(id(1));
        stack.take_undo();
        stack.push_undone(EditBatch::single(id(2)));
        stack.record(id(3));
        assert_eq!(stack.redo_levels(), 0);

        stack.push_undone(EditBatch::single(id(4)));
        let batch = stack.take_undo().unwrap();
        stack.restore_undo(batch.clone());
        assert_eq!(stack.redo_levels(), 1);
        assert_eq!(stack.take_undo(), Some(batch));

        let redo = stack.take_redo().unwrap();
        stack.restore_redo(redo);
        assert_eq!(stack.redo_levels(), 1);
        assert_eq!(stack.take_redo().unwrap().edits, vec![id(4)]);
    }

    #[test]
    fn test_forget_removes_empty_batches() {
        let mut stack = UndoStack::new();
        stack.record(id(1));
        stack.record(id(2));
        stack.forget(id(2));
        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.take_undo().unwrap().edits, vec![id(1)]);
    }
}
