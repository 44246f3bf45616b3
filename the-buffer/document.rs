//! Document core state: text, anchors, bookmarks and undo.
//!
//! The document is the single mutable owner of the text. Everything else
//! (anchors, bookmarks, recorded operations) refers into it by id and is
//! updated by the document as part of each mutation.
//!
//! # Mutation order
//!
//! Every `insert`/`remove`/`replace` runs these steps to completion before
//! returning:
//!
//! 1. record an undo operation, unless the undo stack is replaying
//! 2. change the rope
//! 3. map all anchors through the change
//! 4. dispatch anchor deletions, removing bookmarks whose anchor died
//! 5. request and commit a redraw
//!
//! Notifications are appended to an event log drained with
//! [`Document::take_events`].
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use ropey::Rope;
//! use the_buffer::{
//!   bookmark::Bookmark,
//!   document::{
//!     Document,
//!     DocumentId,
//!   },
//!   position::TextLocation,
//! };
//!
//! let id = DocumentId::new(NonZeroUsize::new(1).unwrap());
//! let mut doc = Document::new(id, Rope::from("fn main() {}\n"));
//! let mark = doc.add_bookmark(Bookmark::new(TextLocation::new(0, 3)));
//!
//! doc.insert(0, "pub ").unwrap();
//! assert_eq!(doc.bookmark_location(mark).unwrap(), TextLocation::new(0, 7));
//!
//! doc.undo().unwrap();
//! assert_eq!(doc.text().to_string(), "fn main() {}\n");
//! ```

use std::{
  collections::VecDeque,
  num::NonZeroUsize,
};

use ropey::Rope;
use thiserror::Error;

use crate::{
  anchor::{
    AnchorError,
    AnchorId,
    AnchorMovement,
    AnchorSet,
    DeletedAnchors,
  },
  bookmark::{
    Activation,
    ActivationOutcome,
    Attachment,
    Bookmark,
    BookmarkCollection,
    BookmarkEvent,
    BookmarkId,
    MarginRenderer,
    PointerButton,
  },
  config::BufferConfig,
  position::{
    self,
    TextLocation,
  },
  undo::{
    Undoable,
    UndoableInsert,
    UndoableRemove,
    UndoableReplace,
    UndoError,
    UndoStack,
  },
  update::{
    TextAreaUpdate,
    UpdateQueue,
  },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(NonZeroUsize);

impl DocumentId {
  pub const fn new(id: NonZeroUsize) -> Self {
    Self(id)
  }

  pub const fn get(self) -> NonZeroUsize {
    self.0
  }
}

impl From<NonZeroUsize> for DocumentId {
  fn from(value: NonZeroUsize) -> Self {
    Self::new(value)
  }
}

#[derive(Debug, Error)]
pub enum DocumentError {
  #[error("offset {offset} is out of bounds for document length {len}")]
  OffsetOutOfBounds { offset: usize, len: usize },
  #[error("range {offset}..{end} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    offset: usize,
    end:    usize,
    len:    usize,
  },
  #[error("bookmark {0:?} is not in this document")]
  UnknownBookmark(BookmarkId),
  #[error("operation recorded on document {expected:?} cannot be replayed on {actual:?}")]
  ForeignOperation {
    expected: DocumentId,
    actual:   DocumentId,
  },
  #[error(transparent)]
  Anchor(#[from] AnchorError),
  #[error(transparent)]
  Undo(#[from] UndoError),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// Why a bookmark left a document's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
  /// The text under its anchor was removed.
  AnchorDeleted,
  /// It was clicked away in the margin.
  Activated,
  /// It was removed or moved to another document on request.
  Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
  TextChanged {
    offset:   usize,
    removed:  usize,
    inserted: usize,
  },
  AnchorDeleted {
    anchor: AnchorId,
  },
  BookmarkRemoved {
    bookmark: BookmarkId,
    reason:   RemovalReason,
  },
  Bookmark {
    bookmark: BookmarkId,
    event:    BookmarkEvent,
  },
}

/// A line of the document at the time it was looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
  pub index:            usize,
  /// Char offset of the first char of the line.
  pub offset:           usize,
  /// Length in chars, without the terminator.
  pub length:           usize,
  pub delimiter_length: usize,
}

impl LineSegment {
  #[inline]
  pub fn end_offset(&self) -> usize {
    self.offset + self.length
  }

  #[inline]
  pub fn total_length(&self) -> usize {
    self.length + self.delimiter_length
  }
}

#[derive(Debug)]
pub struct Document {
  id:         DocumentId,
  text:       Rope,
  anchors:    AnchorSet,
  bookmarks:  BookmarkCollection,
  undo_stack: UndoStack,
  updates:    UpdateQueue,
  events:     VecDeque<DocumentEvent>,
  dropped:    usize,
  config:     BufferConfig,
  version:    u64,
}

impl Document {
  pub fn new(id: DocumentId, text: Rope) -> Self {
    Self::with_config(id, text, BufferConfig::default())
  }

  pub fn with_config(id: DocumentId, text: Rope, config: BufferConfig) -> Self {
    Self {
      id,
      text,
      anchors: AnchorSet::new(),
      bookmarks: BookmarkCollection::new(),
      undo_stack: UndoStack::with_limit(config.undo_limit),
      updates: UpdateQueue::new(),
      events: VecDeque::new(),
      dropped: 0,
      config,
      version: 0,
    }
  }

  pub fn id(&self) -> DocumentId {
    self.id
  }

  pub fn text(&self) -> &Rope {
    &self.text
  }

  /// Length of the text in chars.
  pub fn len_chars(&self) -> usize {
    self.text.len_chars()
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn config(&self) -> &BufferConfig {
    &self.config
  }

  pub fn total_lines(&self) -> usize {
    self.text.len_lines()
  }

  pub fn line_segment(&self, index: usize) -> Option<LineSegment> {
    if index >= self.total_lines() {
      return None;
    }

    let line = self.text.line(index);
    Some(LineSegment {
      index,
      offset: self.text.line_to_char(index),
      length: position::line_content_len(line),
      delimiter_length: position::line_delimiter_len(line),
    })
  }

  pub fn line_segment_for_offset(&self, offset: usize) -> Option<LineSegment> {
    if offset > self.len_chars() {
      return None;
    }
    self.line_segment(self.text.char_to_line(offset))
  }

  pub fn location_at_offset(&self, offset: usize) -> TextLocation {
    position::location_at_offset(self.text.slice(..), offset)
  }

  pub fn offset_at_location(&self, location: TextLocation) -> usize {
    position::offset_at_location(self.text.slice(..), location)
  }

  // -- Editing ----------------------------------------------------------------

  /// Inserts `text` at char `offset`.
  ///
  /// # Errors
  /// [`DocumentError::OffsetOutOfBounds`] if `offset` is past the end.
  pub fn insert(&mut self, offset: usize, text: &str) -> Result<()> {
    self.check_offset(offset)?;
    if text.is_empty() {
      return Ok(());
    }

    if self.undo_stack.accept_changes() {
      let operation = UndoableInsert::new(self, offset, text)?;
      self.undo_stack.push(operation);
    }

    self.apply_insert(offset, text);
    self.finish_edit(offset, text);
    Ok(())
  }

  /// Removes `length` chars starting at char `offset`.
  ///
  /// # Errors
  /// [`DocumentError::RangeOutOfBounds`] if the range extends past the end.
  pub fn remove(&mut self, offset: usize, length: usize) -> Result<()> {
    self.check_range(offset, length)?;
    if length == 0 {
      return Ok(());
    }

    if self.undo_stack.accept_changes() {
      let operation = UndoableRemove::new(self, offset, length)?;
      self.undo_stack.push(operation);
    }

    let (removed, deleted) = self.apply_remove(offset, length);
    self.dispatch_deleted_anchors(deleted);
    self.finish_edit(offset, &removed);
    Ok(())
  }

  /// Replaces `length` chars at `offset` with `text`, recorded as one
  /// operation.
  pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<()> {
    self.check_range(offset, length)?;
    if length == 0 && text.is_empty() {
      return Ok(());
    }

    if self.undo_stack.accept_changes() {
      let operation = UndoableReplace::new(self, offset, length, text)?;
      self.undo_stack.push(operation);
    }

    let (removed, deleted) = self.apply_remove(offset, length);
    self.apply_insert(offset, text);
    self.dispatch_deleted_anchors(deleted);

    let touched = if position::str_has_line_ending(&removed) {
      removed.as_str()
    } else {
      text
    };
    self.finish_edit(offset, touched);
    Ok(())
  }

  fn check_offset(&self, offset: usize) -> Result<()> {
    let len = self.len_chars();
    if offset > len {
      return Err(DocumentError::OffsetOutOfBounds { offset, len });
    }
    Ok(())
  }

  fn check_range(&self, offset: usize, length: usize) -> Result<()> {
    let len = self.len_chars();
    let end = offset.saturating_add(length);
    if end > len {
      return Err(DocumentError::RangeOutOfBounds { offset, end, len });
    }
    Ok(())
  }

  fn apply_insert(&mut self, offset: usize, text: &str) {
    if text.is_empty() {
      return;
    }

    let inserted = text.chars().count();
    self.text.insert(offset, text);
    self.anchors.map_insert(offset, inserted);
    self.emit(DocumentEvent::TextChanged {
      offset,
      removed: 0,
      inserted,
    });
  }

  fn apply_remove(&mut self, offset: usize, length: usize) -> (String, DeletedAnchors) {
    if length == 0 {
      return (String::new(), DeletedAnchors::new());
    }

    let end = offset + length;
    let removed = self.text.slice(offset..end).to_string();
    self.text.remove(offset..end);
    let deleted = self.anchors.map_remove(offset, length);
    self.emit(DocumentEvent::TextChanged {
      offset,
      removed: length,
      inserted: 0,
    });
    (removed, deleted)
  }

  /// Delivers deletion notifications once all anchors have been mapped.
  fn dispatch_deleted_anchors(&mut self, deleted: DeletedAnchors) {
    for anchor in deleted {
      tracing::debug!(?anchor, "anchor deleted");
      self.emit(DocumentEvent::AnchorDeleted { anchor });

      if let Some(bookmark) = self.bookmarks.owner_of(anchor) {
        self.bookmarks.remove_mark(bookmark);
        tracing::debug!(?bookmark, "removed bookmark with deleted anchor");
        self.emit(DocumentEvent::BookmarkRemoved {
          bookmark,
          reason: RemovalReason::AnchorDeleted,
        });
      }
    }
  }

  /// `touched` is the text whose line terminators decide how much needs
  /// redrawing.
  fn finish_edit(&mut self, offset: usize, touched: &str) {
    self.version = self.version.saturating_add(1);

    let location = self.location_at_offset(offset);
    let update = if position::str_has_line_ending(touched) {
      TextAreaUpdate::PositionToEnd(location)
    } else {
      TextAreaUpdate::SingleLine(location.line)
    };
    self.request_update(update);
    self.commit_update();
  }

  // -- Undo -------------------------------------------------------------------

  pub fn undo_stack(&self) -> &UndoStack {
    &self.undo_stack
  }

  pub fn undo_stack_mut(&mut self) -> &mut UndoStack {
    &mut self.undo_stack
  }

  /// Undoes the most recent operation. Returns false if there was nothing to
  /// undo.
  ///
  /// If the replay fails the operation goes back onto the undo list and the
  /// error is returned.
  pub fn undo(&mut self) -> Result<bool> {
    self.undo_stack.ensure_no_open_group()?;
    let Some(operation) = self.undo_stack.pop_undo() else {
      return Ok(false);
    };

    match operation.undo(self) {
      Ok(()) => {
        self.undo_stack.push_redo(operation);
        Ok(true)
      },
      Err(err) => {
        tracing::warn!(%err, "undo failed");
        self.undo_stack.push_undo(operation);
        Err(err)
      },
    }
  }

  /// Redoes the most recently undone operation. Returns false if there was
  /// nothing to redo.
  pub fn redo(&mut self) -> Result<bool> {
    self.undo_stack.ensure_no_open_group()?;
    let Some(operation) = self.undo_stack.pop_redo() else {
      return Ok(false);
    };

    match operation.redo(self) {
      Ok(()) => {
        self.undo_stack.push_undo(operation);
        Ok(true)
      },
      Err(err) => {
        tracing::warn!(%err, "redo failed");
        self.undo_stack.push_redo(operation);
        Err(err)
      },
    }
  }

  // -- Anchors ----------------------------------------------------------------

  pub fn anchors(&self) -> &AnchorSet {
    &self.anchors
  }

  /// Creates an anchor at `column` of `segment`, clamped to the line and to
  /// the current text.
  pub fn create_anchor(
    &mut self,
    segment: &LineSegment,
    column: usize,
    movement: AnchorMovement,
  ) -> AnchorId {
    let offset = (segment.offset + column.min(segment.length)).min(self.len_chars());
    self.anchors.create(offset, movement)
  }

  /// Creates an anchor at `location`, clamped into the text.
  pub fn create_anchor_at(&mut self, location: TextLocation, movement: AnchorMovement) -> AnchorId {
    let offset = self.offset_at_location(location);
    self.anchors.create(offset, movement)
  }

  pub fn anchor_offset(&self, anchor: AnchorId) -> Result<usize> {
    Ok(self.anchors.offset(anchor)?)
  }

  /// Live line/column of `anchor`.
  ///
  /// # Errors
  /// [`AnchorError::Deleted`] once the text under the anchor was removed.
  pub fn anchor_location(&self, anchor: AnchorId) -> Result<TextLocation> {
    let offset = self.anchors.offset(anchor)?;
    Ok(self.location_at_offset(offset))
  }

  pub fn is_anchor_deleted(&self, anchor: AnchorId) -> bool {
    self.anchors.is_deleted(anchor)
  }

  pub fn set_anchor_movement(&mut self, anchor: AnchorId, movement: AnchorMovement) -> Result<()> {
    Ok(self.anchors.set_movement(anchor, movement)?)
  }

  pub fn release_anchor(&mut self, anchor: AnchorId) -> bool {
    if let Some(bookmark) = self.bookmarks.owner_of(anchor) {
      tracing::warn!(?anchor, ?bookmark, "refusing to release an anchor held by a bookmark");
      return false;
    }
    self.anchors.release(anchor)
  }

  /// Drops the records of deleted anchors. Their ids report
  /// [`AnchorError::Unknown`] afterwards.
  pub fn purge_deleted_anchors(&mut self) -> usize {
    self.anchors.purge_deleted()
  }

  // -- Bookmarks --------------------------------------------------------------

  pub fn bookmarks(&self) -> &BookmarkCollection {
    &self.bookmarks
  }

  pub fn bookmark(&self, id: BookmarkId) -> Option<&Bookmark> {
    self.bookmarks.get(id)
  }

  fn bookmark_anchor(&mut self, location: TextLocation) -> AnchorId {
    let clamped = position::clamp_location(self.text.slice(..), location);
    if clamped != location {
      tracing::debug!(%location, %clamped, "clamped bookmark location");
    }
    let movement = self.config.bookmark_movement;
    self.create_anchor_at(clamped, movement)
  }

  /// Attaches `bookmark` to this document and takes ownership of it. The
  /// anchor is created at the bookmark's location, clamped into the text.
  pub fn add_bookmark(&mut self, mut bookmark: Bookmark) -> BookmarkId {
    let anchor = self.bookmark_anchor(bookmark.raw_location());
    bookmark.attach(self.id, anchor);
    let id = self.bookmarks.insert(bookmark);
    self.emit(DocumentEvent::Bookmark {
      bookmark: id,
      event:    BookmarkEvent::DocumentChanged { document: self.id },
    });
    id
  }

  /// Removes a bookmark and hands it back detached, with its raw location set
  /// to where its anchor was.
  pub fn remove_bookmark(&mut self, id: BookmarkId) -> Option<Bookmark> {
    self.take_bookmark(id, RemovalReason::Detached)
  }

  fn take_bookmark(&mut self, id: BookmarkId, reason: RemovalReason) -> Option<Bookmark> {
    let mut bookmark = self.bookmarks.remove_mark(id)?;
    let resolved = bookmark
      .anchor()
      .and_then(|anchor| self.anchor_location(anchor).ok())
      .unwrap_or_else(|| bookmark.raw_location());

    if let Some(anchor) = bookmark.detach(resolved) {
      self.anchors.release(anchor);
    }

    tracing::debug!(bookmark = ?id, ?reason, "removed bookmark");
    self.emit(DocumentEvent::BookmarkRemoved {
      bookmark: id,
      reason,
    });
    Some(bookmark)
  }

  /// Moves a bookmark to `target`, keeping its current location. Moving to a
  /// document with the same id is a no-op.
  pub fn transfer_bookmark(&mut self, id: BookmarkId, target: &mut Document) -> Result<BookmarkId> {
    if !self.bookmarks.contains(id) {
      return Err(DocumentError::UnknownBookmark(id));
    }
    if target.id == self.id {
      return Ok(id);
    }

    let bookmark = self
      .take_bookmark(id, RemovalReason::Detached)
      .ok_or(DocumentError::UnknownBookmark(id))?;
    Ok(target.add_bookmark(bookmark))
  }

  /// Live location of a bookmark.
  pub fn bookmark_location(&self, id: BookmarkId) -> Result<TextLocation> {
    let bookmark = self
      .bookmarks
      .get(id)
      .ok_or(DocumentError::UnknownBookmark(id))?;

    match bookmark.attachment() {
      Attachment::Attached { anchor, .. } => self.anchor_location(anchor),
      Attachment::Unattached => Ok(bookmark.raw_location()),
    }
  }

  /// Moves a bookmark to `location`. The old anchor is released so its
  /// deletion no longer reaches the bookmark.
  pub fn set_bookmark_location(&mut self, id: BookmarkId, location: TextLocation) -> Result<()> {
    if !self.bookmarks.contains(id) {
      return Err(DocumentError::UnknownBookmark(id));
    }

    let anchor = self.bookmark_anchor(location);
    if let Some(old) = self.bookmarks.rebind(id, location, anchor) {
      self.anchors.release(old);
    }
    Ok(())
  }

  /// Enables or disables a bookmark. Returns whether anything changed; an
  /// unchanged flag produces no event and no redraw.
  pub fn set_bookmark_enabled(&mut self, id: BookmarkId, enabled: bool) -> Result<bool> {
    let line = self.bookmark_location(id)?.line;
    let bookmark = self
      .bookmarks
      .get_mut(id)
      .ok_or(DocumentError::UnknownBookmark(id))?;
    let Some(event) = bookmark.set_enabled(enabled) else {
      return Ok(false);
    };

    self.request_update(TextAreaUpdate::SingleLine(line));
    self.commit_update();
    self.emit(DocumentEvent::Bookmark {
      bookmark: id,
      event,
    });
    Ok(true)
  }

  /// A primary activation removes a toggleable bookmark. Everything else is
  /// left to the caller.
  pub fn activate_bookmark(
    &mut self,
    id: BookmarkId,
    activation: Activation,
  ) -> Result<ActivationOutcome> {
    let bookmark = self
      .bookmarks
      .get(id)
      .ok_or(DocumentError::UnknownBookmark(id))?;

    if activation.button == PointerButton::Primary && bookmark.can_toggle() {
      self.take_bookmark(id, RemovalReason::Activated);
      return Ok(ActivationOutcome::Handled);
    }
    Ok(ActivationOutcome::Unhandled)
  }

  /// Draws every bookmark whose line `line_to_y` maps to a vertical position.
  pub fn render_bookmarks(
    &self,
    margin: &mut dyn MarginRenderer,
    mut line_to_y: impl FnMut(usize) -> Option<i32>,
  ) {
    for (id, bookmark) in self.bookmarks.iter() {
      let Ok(location) = self.bookmark_location(id) else {
        continue;
      };
      if let Some(y) = line_to_y(location.line) {
        bookmark.render(margin, y);
      }
    }
  }

  // -- Updates and events -----------------------------------------------------

  pub fn request_update(&mut self, update: TextAreaUpdate) {
    self.updates.request(update);
  }

  pub fn commit_update(&mut self) {
    self.updates.commit();
  }

  pub fn pending_updates(&self) -> &[TextAreaUpdate] {
    self.updates.pending()
  }

  pub fn take_committed_updates(&mut self) -> Vec<TextAreaUpdate> {
    self.updates.take_committed()
  }

  /// Appends to the event log, dropping the oldest entry once the log holds
  /// `event_limit` events.
  fn emit(&mut self, event: DocumentEvent) {
    let limit = self.config.event_limit;
    if limit > 0 && self.events.len() >= limit {
      self.events.pop_front();
      self.dropped += 1;
      if self.dropped == 1 {
        tracing::debug!(limit, "event log full, dropping oldest events");
      }
    }
    self.events.push_back(event);
  }

  pub fn events(&self) -> impl Iterator<Item = &DocumentEvent> {
    self.events.iter()
  }

  /// Events dropped from the front of the log since it was last drained.
  pub fn dropped_events(&self) -> usize {
    self.dropped
  }

  pub fn take_events(&mut self) -> Vec<DocumentEvent> {
    self.dropped = 0;
    self.events.drain(..).collect()
  }
}
