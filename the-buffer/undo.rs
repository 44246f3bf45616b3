//! Undoable operations and the per-document undo stack.
//!
//! Every text mutation of a [`Document`] records an [`UndoableOperation`]
//! while the stack is accepting changes. Undoing or redoing an operation goes
//! back through the same document API (`insert`/`remove`), so anchors and
//! bookmarks are adjusted exactly as for a live edit. To keep that replay from
//! being recorded again, the operation runs inside a [`ReplayGuard`]:
//!
//! ```text
//! Document::undo
//!   └─ op.undo(doc)
//!        ├─ begin_replay()        accept_changes() == false
//!        ├─ op.revert(doc)        doc.remove(..) / doc.insert(..)
//!        └─ guard dropped         accept_changes() == true again
//! ```
//!
//! The guard is a depth counter, so nested brackets never re-enable recording
//! early, and it is released on every exit path including errors.
//!
//! Operations pushed between [`UndoStack::start_undo_group`] and the matching
//! [`UndoStack::end_undo_group`] are stored as one [`UndoGroup`], which is
//! undone and redone as a single step under a single bracket.

use std::{
  cell::Cell,
  rc::Rc,
};

use thiserror::Error;

use crate::{
  Tendril,
  document::{
    self,
    Document,
    DocumentError,
    DocumentId,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UndoError {
  #[error("offset {offset} is outside the document (length {len})")]
  OffsetOutOfRange { offset: usize, len: usize },
  #[error("range {offset}..{end} is outside the document (length {len})")]
  RangeOutOfRange {
    offset: usize,
    end:    usize,
    len:    usize,
  },
  #[error("cannot undo or redo while {depth} undo group(s) are open")]
  GroupOpen { depth: usize },
  #[error("no undo group is open")]
  NoOpenGroup,
}

pub type Result<T> = std::result::Result<T, UndoError>;

/// An edit that can be reverted and re-applied on the document it was
/// recorded on.
pub trait Undoable {
  /// Applies the inverse edit. Does not touch the recording gate.
  fn revert(&self, document: &mut Document) -> document::Result<()>;

  /// Applies the edit again. Does not touch the recording gate.
  fn apply(&self, document: &mut Document) -> document::Result<()>;

  fn undo(&self, document: &mut Document) -> document::Result<()> {
    let _replay = document.undo_stack().begin_replay();
    self.revert(document)
  }

  fn redo(&self, document: &mut Document) -> document::Result<()> {
    let _replay = document.undo_stack().begin_replay();
    self.apply(document)
  }
}

fn ensure_document(recorded: DocumentId, document: &Document) -> document::Result<()> {
  if recorded != document.id() {
    return Err(DocumentError::ForeignOperation {
      expected: recorded,
      actual:   document.id(),
    });
  }
  Ok(())
}

fn char_len(text: &str) -> usize {
  text.chars().count()
}

/// Record of `text` inserted at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoableInsert {
  document: DocumentId,
  offset:   usize,
  text:     Tendril,
}

impl UndoableInsert {
  /// # Errors
  /// [`UndoError::OffsetOutOfRange`] if `offset` is past the end of the
  /// document.
  pub fn new(document: &Document, offset: usize, text: impl Into<Tendril>) -> Result<Self> {
    let len = document.len_chars();
    if offset > len {
      return Err(UndoError::OffsetOutOfRange { offset, len });
    }

    Ok(Self {
      document: document.id(),
      offset,
      text: text.into(),
    })
  }

  pub fn document(&self) -> DocumentId {
    self.document
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn text(&self) -> &str {
    &self.text
  }
}

impl Undoable for UndoableInsert {
  fn revert(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.remove(self.offset, char_len(&self.text))
  }

  fn apply(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.insert(self.offset, &self.text)
  }
}

/// Record of `offset..offset + length` being removed. Captures the removed
/// text at construction, so it must be built before the remove happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoableRemove {
  document: DocumentId,
  offset:   usize,
  text:     Tendril,
}

impl UndoableRemove {
  pub fn new(document: &Document, offset: usize, length: usize) -> Result<Self> {
    let len = document.len_chars();
    let end = offset.saturating_add(length);
    if end > len {
      return Err(UndoError::RangeOutOfRange { offset, end, len });
    }

    Ok(Self {
      document: document.id(),
      offset,
      text: Tendril::from(document.text().slice(offset..end).to_string()),
    })
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn text(&self) -> &str {
    &self.text
  }
}

impl Undoable for UndoableRemove {
  fn revert(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.insert(self.offset, &self.text)
  }

  fn apply(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.remove(self.offset, char_len(&self.text))
  }
}

/// Record of `offset..offset + length` being replaced by new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoableReplace {
  document: DocumentId,
  offset:   usize,
  removed:  Tendril,
  inserted: Tendril,
}

impl UndoableReplace {
  pub fn new(
    document: &Document,
    offset: usize,
    length: usize,
    inserted: impl Into<Tendril>,
  ) -> Result<Self> {
    let removed = UndoableRemove::new(document, offset, length)?;
    Ok(Self {
      document: removed.document,
      offset,
      removed: removed.text,
      inserted: inserted.into(),
    })
  }

  pub fn offset(&self) -> usize {
    self.offset
  }

  pub fn removed(&self) -> &str {
    &self.removed
  }

  pub fn inserted(&self) -> &str {
    &self.inserted
  }
}

impl Undoable for UndoableReplace {
  fn revert(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.replace(self.offset, char_len(&self.inserted), &self.removed)
  }

  fn apply(&self, document: &mut Document) -> document::Result<()> {
    ensure_document(self.document, document)?;
    document.replace(self.offset, char_len(&self.removed), &self.inserted)
  }
}

/// Several operations undone and redone as one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoGroup {
  operations: Vec<UndoableOperation>,
}

impl UndoGroup {
  pub fn new(operations: Vec<UndoableOperation>) -> Self {
    Self { operations }
  }

  pub fn operations(&self) -> &[UndoableOperation] {
    &self.operations
  }

  pub fn len(&self) -> usize {
    self.operations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }
}

/// A failed step rolls the steps before it back, so the document is left as
/// it was before the group ran.
impl Undoable for UndoGroup {
  fn revert(&self, document: &mut Document) -> document::Result<()> {
    for (done, operation) in self.operations.iter().rev().enumerate() {
      if let Err(err) = operation.revert(document) {
        let reverted = &self.operations[self.operations.len() - done..];
        rollback(reverted.iter(), document, UndoableOperation::apply);
        return Err(err);
      }
    }
    Ok(())
  }

  fn apply(&self, document: &mut Document) -> document::Result<()> {
    for (done, operation) in self.operations.iter().enumerate() {
      if let Err(err) = operation.apply(document) {
        rollback(self.operations[..done].iter().rev(), document, UndoableOperation::revert);
        return Err(err);
      }
    }
    Ok(())
  }
}

fn rollback<'a>(
  operations: impl Iterator<Item = &'a UndoableOperation>,
  document: &mut Document,
  step: fn(&UndoableOperation, &mut Document) -> document::Result<()>,
) {
  for operation in operations {
    if let Err(err) = step(operation, document) {
      tracing::warn!(%err, "rolling back a partially replayed undo group failed");
      return;
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoableOperation {
  Insert(UndoableInsert),
  Remove(UndoableRemove),
  Replace(UndoableReplace),
  Group(UndoGroup),
}

impl Undoable for UndoableOperation {
  fn revert(&self, document: &mut Document) -> document::Result<()> {
    match self {
      Self::Insert(op) => op.revert(document),
      Self::Remove(op) => op.revert(document),
      Self::Replace(op) => op.revert(document),
      Self::Group(group) => group.revert(document),
    }
  }

  fn apply(&self, document: &mut Document) -> document::Result<()> {
    match self {
      Self::Insert(op) => op.apply(document),
      Self::Remove(op) => op.apply(document),
      Self::Replace(op) => op.apply(document),
      Self::Group(group) => group.apply(document),
    }
  }
}

impl From<UndoableInsert> for UndoableOperation {
  fn from(op: UndoableInsert) -> Self {
    Self::Insert(op)
  }
}

impl From<UndoableRemove> for UndoableOperation {
  fn from(op: UndoableRemove) -> Self {
    Self::Remove(op)
  }
}

impl From<UndoableReplace> for UndoableOperation {
  fn from(op: UndoableReplace) -> Self {
    Self::Replace(op)
  }
}

impl From<UndoGroup> for UndoableOperation {
  fn from(group: UndoGroup) -> Self {
    Self::Group(group)
  }
}

/// Suspends recording on an [`UndoStack`] until dropped.
#[derive(Debug)]
#[must_use = "recording resumes as soon as the guard is dropped"]
pub struct ReplayGuard {
  depth: Rc<Cell<usize>>,
}

impl Drop for ReplayGuard {
  fn drop(&mut self) {
    let depth = self.depth.get().saturating_sub(1);
    self.depth.set(depth);
    tracing::trace!(depth, "left replay");
  }
}

#[derive(Debug, Default)]
pub struct UndoStack {
  undo:         Vec<UndoableOperation>,
  redo:         Vec<UndoableOperation>,
  replay_depth: Rc<Cell<usize>>,
  group_depth:  usize,
  group:        Vec<UndoableOperation>,
  limit:        usize,
}

impl UndoStack {
  pub fn new() -> Self {
    Self::default()
  }

  /// A stack keeping at most `limit` undo entries; `0` means unbounded.
  pub fn with_limit(limit: usize) -> Self {
    Self {
      limit,
      ..Self::default()
    }
  }

  #[inline]
  pub fn limit(&self) -> usize {
    self.limit
  }

  /// Whether pushed operations are recorded. False while any
  /// [`ReplayGuard`] is alive.
  #[inline]
  pub fn accept_changes(&self) -> bool {
    self.replay_depth.get() == 0
  }

  pub fn begin_replay(&self) -> ReplayGuard {
    let depth = self.replay_depth.get() + 1;
    self.replay_depth.set(depth);
    tracing::trace!(depth, "entered replay");
    ReplayGuard {
      depth: Rc::clone(&self.replay_depth),
    }
  }

  #[inline]
  pub fn can_undo(&self) -> bool {
    !self.undo.is_empty()
  }

  #[inline]
  pub fn can_redo(&self) -> bool {
    !self.redo.is_empty()
  }

  #[inline]
  pub fn undo_len(&self) -> usize {
    self.undo.len()
  }

  #[inline]
  pub fn redo_len(&self) -> usize {
    self.redo.len()
  }

  #[inline]
  pub fn group_depth(&self) -> usize {
    self.group_depth
  }

  /// Records a new operation and clears the redo list. Ignored while
  /// replaying.
  pub fn push(&mut self, operation: impl Into<UndoableOperation>) {
    if !self.accept_changes() {
      tracing::trace!("dropped operation pushed during replay");
      return;
    }

    let operation = operation.into();
    if self.group_depth > 0 {
      self.group.push(operation);
    } else {
      self.push_undo(operation);
    }
    self.redo.clear();
  }

  pub fn start_undo_group(&mut self) {
    self.group_depth += 1;
  }

  /// Closes the innermost group. Closing the outermost one stores everything
  /// pushed since it was opened as a single entry.
  pub fn end_undo_group(&mut self) -> Result<()> {
    if self.group_depth == 0 {
      return Err(UndoError::NoOpenGroup);
    }
    self.group_depth -= 1;
    if self.group_depth > 0 {
      return Ok(());
    }

    let mut operations = std::mem::take(&mut self.group);
    match operations.len() {
      0 => {},
      1 => {
        if let Some(operation) = operations.pop() {
          self.push_undo(operation);
        }
      },
      _ => self.push_undo(UndoGroup::new(operations).into()),
    }
    Ok(())
  }

  pub fn clear_all(&mut self) {
    self.undo.clear();
    self.redo.clear();
    self.group.clear();
    self.group_depth = 0;
  }

  pub(crate) fn ensure_no_open_group(&self) -> Result<()> {
    if self.group_depth > 0 {
      return Err(UndoError::GroupOpen {
        depth: self.group_depth,
      });
    }
    Ok(())
  }

  /// Pushes onto the undo list without touching the redo list.
  pub(crate) fn push_undo(&mut self, operation: UndoableOperation) {
    self.undo.push(operation);
    if self.limit > 0 && self.undo.len() > self.limit {
      let excess = self.undo.len() - self.limit;
      self.undo.drain(..excess);
    }
  }

  pub(crate) fn push_redo(&mut self, operation: UndoableOperation) {
    self.redo.push(operation);
  }

  pub(crate) fn pop_undo(&mut self) -> Option<UndoableOperation> {
    self.undo.pop()
  }

  pub(crate) fn pop_redo(&mut self) -> Option<UndoableOperation> {
    self.redo.pop()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::RefCell,
    num::NonZeroUsize,
  };

  use ropey::Rope;

  use super::*;

  fn document(text: &str) -> Document {
    Document::new(DocumentId::new(NonZeroUsize::new(1).unwrap()), Rope::from(text))
  }

  fn insert_at(doc: &Document, offset: usize, text: &str) -> UndoableOperation {
    UndoableInsert::new(doc, offset, text).unwrap().into()
  }

  #[test]
  fn replay_guard_nests() {
    let stack = UndoStack::new();
    assert!(stack.accept_changes());

    let outer = stack.begin_replay();
    let inner = stack.begin_replay();
    drop(inner);
    assert!(!stack.accept_changes());
    drop(outer);
    assert!(stack.accept_changes());
  }

  #[test]
  fn pushes_during_replay_are_dropped() {
    let doc = document("abc");
    let mut stack = UndoStack::new();

    let guard = stack.begin_replay();
    stack.push(insert_at(&doc, 0, "x"));
    drop(guard);
    assert_eq!(stack.undo_len(), 0);

    stack.push(insert_at(&doc, 0, "x"));
    assert_eq!(stack.undo_len(), 1);
  }

  #[test]
  fn new_operations_clear_redo() {
    let doc = document("abc");
    let mut stack = UndoStack::new();
    stack.push_redo(insert_at(&doc, 1, "y"));
    assert!(stack.can_redo());

    stack.push(insert_at(&doc, 0, "x"));
    assert!(!stack.can_redo());
  }

  #[test]
  fn limit_drops_oldest_entries() {
    let doc = document("abc");
    let mut stack = UndoStack::with_limit(2);
    for offset in 0..3 {
      stack.push(insert_at(&doc, offset, "x"));
    }

    assert_eq!(stack.undo_len(), 2);
    assert_eq!(stack.pop_undo(), Some(insert_at(&doc, 2, "x")));
    assert_eq!(stack.pop_undo(), Some(insert_at(&doc, 1, "x")));
  }

  #[test]
  fn nested_groups_collapse_into_one_entry() {
    let doc = document("abc");
    let mut stack = UndoStack::new();

    stack.start_undo_group();
    stack.push(insert_at(&doc, 0, "x"));
    stack.start_undo_group();
    stack.push(insert_at(&doc, 1, "y"));
    stack.end_undo_group().unwrap();
    assert_eq!(stack.undo_len(), 0);
    stack.push(insert_at(&doc, 2, "z"));
    stack.end_undo_group().unwrap();

    assert_eq!(stack.undo_len(), 1);
    match stack.pop_undo() {
      Some(UndoableOperation::Group(group)) => assert_eq!(group.len(), 3),
      other => panic!("expected a group, got {other:?}"),
    }
  }

  #[test]
  fn single_and_empty_groups_are_flattened() {
    let doc = document("abc");
    let mut stack = UndoStack::new();

    stack.start_undo_group();
    stack.end_undo_group().unwrap();
    assert_eq!(stack.undo_len(), 0);

    stack.start_undo_group();
    stack.push(insert_at(&doc, 0, "x"));
    stack.end_undo_group().unwrap();
    assert_eq!(stack.pop_undo(), Some(insert_at(&doc, 0, "x")));

    assert_eq!(stack.end_undo_group(), Err(UndoError::NoOpenGroup));
  }

  #[test]
  fn insert_construction_validates_offset() {
    let doc = document("abc");

    assert!(UndoableInsert::new(&doc, 3, "x").is_ok());
    assert_eq!(
      UndoableInsert::new(&doc, 4, "x"),
      Err(UndoError::OffsetOutOfRange { offset: 4, len: 3 })
    );
  }

  #[test]
  fn remove_construction_captures_text() {
    let doc = document("hello world");
    let op = UndoableRemove::new(&doc, 6, 5).unwrap();
    assert_eq!(op.text(), "world");

    assert_eq!(
      UndoableRemove::new(&doc, 6, 6),
      Err(UndoError::RangeOutOfRange {
        offset: 6,
        end:    12,
        len:    11,
      })
    );
  }

  #[test]
  fn insert_undo_and_redo_are_bracketed() {
    let mut doc = document("hello");
    let op = UndoableInsert::new(&doc, 5, " world").unwrap();
    doc.insert(5, " world").unwrap();

    op.undo(&mut doc).unwrap();
    assert_eq!(doc.text().to_string(), "hello");
    assert!(doc.undo_stack().accept_changes());

    op.redo(&mut doc).unwrap();
    assert_eq!(doc.text().to_string(), "hello world");
    assert!(doc.undo_stack().accept_changes());
  }

  #[test]
  fn failed_replay_still_restores_recording() {
    let mut doc = document("hi");
    let op = UndoableInsert::new(&doc, 2, "there").unwrap();

    // Nothing was inserted, so removing five chars at 2 is out of bounds.
    assert!(op.undo(&mut doc).is_err());
    assert!(doc.undo_stack().accept_changes());
  }

  #[test]
  fn operations_refuse_other_documents() {
    let recorded = document("abc");
    let mut other = Document::new(
      DocumentId::new(NonZeroUsize::new(2).unwrap()),
      Rope::from("abc"),
    );
    let op = UndoableInsert::new(&recorded, 0, "x").unwrap();

    assert!(matches!(
      op.redo(&mut other),
      Err(DocumentError::ForeignOperation { .. })
    ));
    assert_eq!(other.text().to_string(), "abc");
  }

  fn other_document(text: &str) -> Document {
    Document::new(DocumentId::new(NonZeroUsize::new(2).unwrap()), Rope::from(text))
  }

  #[test]
  fn failed_group_undo_leaves_text_and_history_intact() {
    let mut doc = document("abc");
    let other = other_document("abc");

    doc.undo_stack_mut().start_undo_group();
    doc.undo_stack_mut().push(insert_at(&other, 0, "x"));
    doc.insert(3, "def").unwrap();
    doc.undo_stack_mut().end_undo_group().unwrap();

    for _ in 0..2 {
      assert!(matches!(
        doc.undo(),
        Err(DocumentError::ForeignOperation { .. })
      ));
      assert_eq!(doc.text().to_string(), "abcdef");
      assert_eq!(doc.undo_stack().undo_len(), 1);
      assert_eq!(doc.undo_stack().redo_len(), 0);
      assert!(doc.undo_stack().accept_changes());
    }
  }

  #[test]
  fn failed_group_redo_rolls_back_applied_steps() {
    let mut doc = document("abc");
    let other = other_document("abc");
    let group = UndoGroup::new(vec![
      insert_at(&doc, 3, "def"),
      insert_at(&other, 0, "x"),
    ]);

    assert!(group.redo(&mut doc).is_err());
    assert_eq!(doc.text().to_string(), "abc");
    assert_eq!(doc.undo_stack().undo_len(), 0);
  }

  #[test]
  fn group_undo_keeps_recording_off_for_every_step() {
    struct Observed {
      group:     UndoGroup,
      recording: RefCell<Vec<bool>>,
    }

    impl Undoable for Observed {
      fn revert(&self, document: &mut Document) -> document::Result<()> {
        for operation in self.group.operations().iter().rev() {
          operation.revert(document)?;
          self
            .recording
            .borrow_mut()
            .push(document.undo_stack().accept_changes());
        }
        Ok(())
      }

      fn apply(&self, document: &mut Document) -> document::Result<()> {
        self.group.apply(document)
      }
    }

    let mut doc = document("ab");
    let observed = Observed {
      group:     UndoGroup::new(vec![insert_at(&doc, 0, "a"), insert_at(&doc, 1, "b")]),
      recording: RefCell::new(Vec::new()),
    };

    observed.undo(&mut doc).unwrap();
    assert_eq!(doc.text().to_string(), "");
    assert_eq!(*observed.recording.borrow(), vec![false, false]);
    assert!(doc.undo_stack().accept_changes());
    assert_eq!(doc.undo_stack().undo_len(), 0);

    doc.undo_stack_mut().start_undo_group();
    doc.insert(0, "x").unwrap();
    doc.insert(1, "y").unwrap();
    doc.insert(2, "z").unwrap();
    doc.undo_stack_mut().end_undo_group().unwrap();

    assert!(doc.undo().unwrap());
    assert_eq!(doc.text().to_string(), "");
    assert_eq!(doc.undo_stack().undo_len(), 0);
    assert_eq!(doc.undo_stack().redo_len(), 1);
  }
}
