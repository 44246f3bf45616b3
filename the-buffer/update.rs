//! Redraw requests batched between a document and its text area.
//!
//! Requests accumulate with [`UpdateQueue::request`] and become visible to the
//! presentation layer only after [`UpdateQueue::commit`]. Once either list
//! holds more than [`COLLAPSE_LIMIT`] entries it collapses into a single
//! [`TextAreaUpdate::WholeTextArea`].

use crate::position::TextLocation;

/// Longest list of distinct updates kept before redrawing everything.
pub const COLLAPSE_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAreaUpdate {
  WholeTextArea,
  SingleLine(usize),
  LinesBetween { first: usize, last: usize },
  /// Everything from the location to the end of the text area.
  PositionToEnd(TextLocation),
}

#[derive(Debug, Default)]
pub struct UpdateQueue {
  pending:   Vec<TextAreaUpdate>,
  committed: Vec<TextAreaUpdate>,
}

impl UpdateQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request(&mut self, update: TextAreaUpdate) {
    if self.pending.contains(&update) || self.pending.contains(&TextAreaUpdate::WholeTextArea) {
      return;
    }
    self.pending.push(update);
    collapse(&mut self.pending);
  }

  pub fn pending(&self) -> &[TextAreaUpdate] {
    &self.pending
  }

  pub fn committed(&self) -> &[TextAreaUpdate] {
    &self.committed
  }

  /// Publishes the pending requests. A whole-area request swallows the rest.
  pub fn commit(&mut self) {
    if self.pending.is_empty() {
      return;
    }

    let whole = self.pending.contains(&TextAreaUpdate::WholeTextArea)
      || self.committed.contains(&TextAreaUpdate::WholeTextArea);
    if whole {
      self.pending.clear();
      self.committed.clear();
      self.committed.push(TextAreaUpdate::WholeTextArea);
      return;
    }

    for update in self.pending.drain(..) {
      if !self.committed.contains(&update) {
        self.committed.push(update);
      }
    }
    collapse(&mut self.committed);
  }

  pub fn take_committed(&mut self) -> Vec<TextAreaUpdate> {
    std::mem::take(&mut self.committed)
  }
}

fn collapse(updates: &mut Vec<TextAreaUpdate>) {
  if updates.len() > COLLAPSE_LIMIT {
    tracing::trace!(len = updates.len(), "collapsed updates into whole text area");
    updates.clear();
    updates.push(TextAreaUpdate::WholeTextArea);
  }
}
