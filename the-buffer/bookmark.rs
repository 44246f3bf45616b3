//! Bookmarks and the per-document bookmark collection.
//!
//! A [`Bookmark`] is either unattached, in which case its raw
//! [`TextLocation`] is all there is, or attached to a document through an
//! anchor. Attached bookmarks only ever live inside a document's
//! [`BookmarkCollection`]; every bookmark value handed out by a document has
//! been detached first, with its raw location refreshed from the anchor.
//!
//! ```text
//!                 Document::add_bookmark
//!   Unattached  ------------------------->  Attached { document, anchor }
//!               <-------------------------
//!                 Document::remove_bookmark
//! ```
//!
//! The collection indexes bookmarks by anchor. That index is the only path
//! through which an anchor deletion reaches a bookmark: the document looks the
//! deleted anchor up and drops the owning bookmark.

use std::collections::HashMap;

use slotmap::{
  SlotMap,
  new_key_type,
};

use crate::{
  anchor::AnchorId,
  document::DocumentId,
  position::TextLocation,
};

new_key_type! {
  /// Handle to a bookmark inside a document's [`BookmarkCollection`].
  pub struct BookmarkId;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkKind {
  #[default]
  Bookmark,
  Breakpoint,
}

impl MarkKind {
  /// Whether the mark can be removed by the bookmark toggle or by clicking
  /// it in the margin.
  pub const fn can_toggle(self) -> bool {
    match self {
      Self::Bookmark => true,
      Self::Breakpoint => false,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
  Unattached,
  Attached {
    document: DocumentId,
    anchor:   AnchorId,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkEvent {
  DocumentChanged { document: DocumentId },
  EnabledChanged { enabled: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
  Primary,
  Secondary,
  Middle,
}

/// Input that activated a bookmark, as decoded by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
  pub button: PointerButton,
}

impl Activation {
  pub const fn primary() -> Self {
    Self {
      button: PointerButton::Primary,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
  Handled,
  Unhandled,
}

/// Draws marks into the icon margin next to the text.
pub trait MarginRenderer {
  fn draw_bookmark(&mut self, y: i32, enabled: bool);

  fn draw_breakpoint(&mut self, y: i32, enabled: bool) {
    self.draw_bookmark(y, enabled);
  }
}

#[derive(Debug)]
pub struct Bookmark {
  kind:       MarkKind,
  location:   TextLocation,
  enabled:    bool,
  attachment: Attachment,
}

impl Bookmark {
  pub fn new(location: TextLocation) -> Self {
    Self::with_enabled(location, true)
  }

  pub fn with_enabled(location: TextLocation, enabled: bool) -> Self {
    Self {
      kind: MarkKind::Bookmark,
      location,
      enabled,
      attachment: Attachment::Unattached,
    }
  }

  pub fn breakpoint(location: TextLocation) -> Self {
    Self {
      kind: MarkKind::Breakpoint,
      ..Self::new(location)
    }
  }

  #[inline]
  pub fn kind(&self) -> MarkKind {
    self.kind
  }

  #[inline]
  pub fn can_toggle(&self) -> bool {
    self.kind.can_toggle()
  }

  #[inline]
  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  #[inline]
  pub fn attachment(&self) -> Attachment {
    self.attachment
  }

  pub fn anchor(&self) -> Option<AnchorId> {
    match self.attachment {
      Attachment::Attached { anchor, .. } => Some(anchor),
      Attachment::Unattached => None,
    }
  }

  pub fn document(&self) -> Option<DocumentId> {
    match self.attachment {
      Attachment::Attached { document, .. } => Some(document),
      Attachment::Unattached => None,
    }
  }

  #[inline]
  pub fn is_attached(&self) -> bool {
    matches!(self.attachment, Attachment::Attached { .. })
  }

  /// The raw location. For an attached bookmark this is the location it was
  /// attached at; use [`crate::document::Document::bookmark_location`] for
  /// the live one.
  #[inline]
  pub fn raw_location(&self) -> TextLocation {
    self.location
  }

  pub fn set_raw_location(&mut self, location: TextLocation) {
    self.location = location;
  }

  /// Returns the notification to deliver, or `None` if nothing changed.
  pub fn set_enabled(&mut self, enabled: bool) -> Option<BookmarkEvent> {
    if self.enabled == enabled {
      return None;
    }
    self.enabled = enabled;
    Some(BookmarkEvent::EnabledChanged { enabled })
  }

  pub fn render(&self, margin: &mut dyn MarginRenderer, y: i32) {
    match self.kind {
      MarkKind::Bookmark => margin.draw_bookmark(y, self.enabled),
      MarkKind::Breakpoint => margin.draw_breakpoint(y, self.enabled),
    }
  }

  pub(crate) fn attach(&mut self, document: DocumentId, anchor: AnchorId) {
    self.attachment = Attachment::Attached { document, anchor };
  }

  /// Drops the attachment and stores `resolved` as the raw location. Returns
  /// the anchor the bookmark was holding.
  pub(crate) fn detach(&mut self, resolved: TextLocation) -> Option<AnchorId> {
    let anchor = self.anchor();
    self.location = resolved;
    self.attachment = Attachment::Unattached;
    anchor
  }

  /// Swaps in a new anchor for an attached bookmark. Returns the old anchor.
  fn rebind(&mut self, location: TextLocation, anchor: AnchorId) -> Option<AnchorId> {
    self.location = location;
    match &mut self.attachment {
      Attachment::Attached { anchor: current, .. } => Some(std::mem::replace(current, anchor)),
      Attachment::Unattached => None,
    }
  }
}

#[derive(Debug, Default)]
pub struct BookmarkCollection {
  marks:     SlotMap<BookmarkId, Bookmark>,
  by_anchor: HashMap<AnchorId, BookmarkId>,
}

impl BookmarkCollection {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.marks.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.marks.is_empty()
  }

  #[inline]
  pub fn contains(&self, id: BookmarkId) -> bool {
    self.marks.contains_key(id)
  }

  pub fn get(&self, id: BookmarkId) -> Option<&Bookmark> {
    self.marks.get(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (BookmarkId, &Bookmark)> {
    self.marks.iter()
  }

  /// The bookmark holding `anchor`, if any.
  pub fn owner_of(&self, anchor: AnchorId) -> Option<BookmarkId> {
    self.by_anchor.get(&anchor).copied()
  }

  pub(crate) fn get_mut(&mut self, id: BookmarkId) -> Option<&mut Bookmark> {
    self.marks.get_mut(id)
  }

  pub(crate) fn insert(&mut self, bookmark: Bookmark) -> BookmarkId {
    let anchor = bookmark.anchor();
    let id = self.marks.insert(bookmark);
    if let Some(anchor) = anchor {
      self.by_anchor.insert(anchor, id);
    }
    id
  }

  pub(crate) fn remove_mark(&mut self, id: BookmarkId) -> Option<Bookmark> {
    let bookmark = self.marks.remove(id)?;
    if let Some(anchor) = bookmark.anchor() {
      self.by_anchor.remove(&anchor);
    }
    Some(bookmark)
  }

  /// Moves bookmark `id` onto `anchor`, returning the anchor it leaves.
  pub(crate) fn rebind(
    &mut self,
    id: BookmarkId,
    location: TextLocation,
    anchor: AnchorId,
  ) -> Option<AnchorId> {
    let old = self.marks.get_mut(id)?.rebind(location, anchor);
    if let Some(old) = old {
      self.by_anchor.remove(&old);
    }
    self.by_anchor.insert(anchor, id);
    old
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct RecordingMargin {
    calls: Vec<(&'static str, i32, bool)>,
  }

  impl MarginRenderer for RecordingMargin {
    fn draw_bookmark(&mut self, y: i32, enabled: bool) {
      self.calls.push(("bookmark", y, enabled));
    }

    fn draw_breakpoint(&mut self, y: i32, enabled: bool) {
      self.calls.push(("breakpoint", y, enabled));
    }
  }

  #[test]
  fn new_bookmarks_are_enabled_and_unattached() {
    let bookmark = Bookmark::new(TextLocation::new(2, 4));

    assert!(bookmark.is_enabled());
    assert!(bookmark.can_toggle());
    assert_eq!(bookmark.attachment(), Attachment::Unattached);
    assert_eq!(bookmark.anchor(), None);
    assert_eq!(bookmark.raw_location(), TextLocation::new(2, 4));
  }

  #[test]
  fn set_enabled_reports_only_changes() {
    let mut bookmark = Bookmark::with_enabled(TextLocation::zero(), false);

    assert_eq!(bookmark.set_enabled(false), None);
    assert_eq!(
      bookmark.set_enabled(true),
      Some(BookmarkEvent::EnabledChanged { enabled: true })
    );
    assert_eq!(bookmark.set_enabled(true), None);
  }

  #[test]
  fn breakpoints_cannot_be_toggled() {
    let breakpoint = Bookmark::breakpoint(TextLocation::zero());

    assert_eq!(breakpoint.kind(), MarkKind::Breakpoint);
    assert!(!breakpoint.can_toggle());
  }

  #[test]
  fn render_dispatches_on_kind() {
    let mut margin = RecordingMargin::default();
    Bookmark::with_enabled(TextLocation::zero(), false).render(&mut margin, 16);
    Bookmark::breakpoint(TextLocation::zero()).render(&mut margin, 32);

    assert_eq!(margin.calls, vec![
      ("bookmark", 16, false),
      ("breakpoint", 32, true)
    ]);
  }
}
