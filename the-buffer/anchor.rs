//! Text anchors: positions that follow the text they point into.
//!
//! An [`AnchorSet`] is owned by a document and holds one record per anchor,
//! keyed by [`AnchorId`]. The document maps every edit through the set:
//!
//! - **Insert** of `len` chars at `offset`: anchors after `offset` move right
//!   by `len`. An anchor exactly at `offset` moves only if its
//!   [`AnchorMovement`] is [`AnchorMovement::AfterInsertion`].
//! - **Remove** of `offset..offset + len`: anchors at or after the end move
//!   left by `len`, anchors inside the range are deleted and collapse to
//!   `offset`.
//!
//! ```text
//! "hello world"      anchor (Before) at 5, anchor (After) at 5
//! insert "," at 5
//! "hello, world"     Before stays at 5, After moves to 6
//! ```
//!
//! Deletion is terminal. A deleted anchor leaves the mapped set and only its
//! id is kept as a tombstone, so that queries report [`AnchorError::Deleted`]
//! instead of silently resolving to a stale position while edits never step
//! over it again. Tombstones go away on [`AnchorSet::release`] or
//! [`AnchorSet::purge_deleted`].

use std::collections::HashSet;

use serde::{
  Deserialize,
  Serialize,
};
use slotmap::{
  SlotMap,
  new_key_type,
};
use smallvec::SmallVec;
use thiserror::Error;

new_key_type! {
  /// Handle to an anchor inside an [`AnchorSet`].
  pub struct AnchorId;
}

/// Tie-break for an anchor sitting exactly where text is inserted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorMovement {
  /// Stay in front of the inserted text.
  #[default]
  BeforeInsertion,
  /// Move behind the inserted text.
  AfterInsertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnchorError {
  #[error("anchor {0:?} has been deleted")]
  Deleted(AnchorId),
  #[error("anchor {0:?} does not exist")]
  Unknown(AnchorId),
}

pub type Result<T> = std::result::Result<T, AnchorError>;

/// Anchors deleted by a single remove, in slot order.
pub type DeletedAnchors = SmallVec<[AnchorId; 4]>;

#[derive(Debug, Clone)]
struct AnchorRecord {
  offset:   usize,
  movement: AnchorMovement,
}

#[derive(Debug, Default)]
pub struct AnchorSet {
  live:       SlotMap<AnchorId, AnchorRecord>,
  tombstones: HashSet<AnchorId>,
}

impl AnchorSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of known ids, tombstones included.
  #[inline]
  pub fn len(&self) -> usize {
    self.live.len() + self.tombstones.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.live.is_empty() && self.tombstones.is_empty()
  }

  #[inline]
  pub fn live_count(&self) -> usize {
    self.live.len()
  }

  pub fn create(&mut self, offset: usize, movement: AnchorMovement) -> AnchorId {
    let id = self.live.insert(AnchorRecord { offset, movement });
    tracing::trace!(?id, offset, ?movement, "created anchor");
    id
  }

  #[inline]
  pub fn contains(&self, id: AnchorId) -> bool {
    self.live.contains_key(id) || self.tombstones.contains(&id)
  }

  #[inline]
  pub fn is_deleted(&self, id: AnchorId) -> bool {
    self.tombstones.contains(&id)
  }

  fn live(&self, id: AnchorId) -> Result<&AnchorRecord> {
    if let Some(record) = self.live.get(id) {
      return Ok(record);
    }
    if self.tombstones.contains(&id) {
      return Err(AnchorError::Deleted(id));
    }
    Err(AnchorError::Unknown(id))
  }

  /// Current char offset of a live anchor.
  ///
  /// # Errors
  /// [`AnchorError::Deleted`] once the anchor's text has been removed,
  /// [`AnchorError::Unknown`] for released or foreign ids.
  pub fn offset(&self, id: AnchorId) -> Result<usize> {
    self.live(id).map(|record| record.offset)
  }

  pub fn movement(&self, id: AnchorId) -> Result<AnchorMovement> {
    self.live(id).map(|record| record.movement)
  }

  pub fn set_movement(&mut self, id: AnchorId, movement: AnchorMovement) -> Result<()> {
    self.live(id)?;
    if let Some(record) = self.live.get_mut(id) {
      record.movement = movement;
    }
    Ok(())
  }

  /// Forgets the id, live or deleted. Returns false if it was not present.
  pub fn release(&mut self, id: AnchorId) -> bool {
    self.live.remove(id).is_some() || self.tombstones.remove(&id)
  }

  /// Drops every tombstone, returning how many were removed.
  pub fn purge_deleted(&mut self) -> usize {
    let purged = self.tombstones.len();
    self.tombstones.clear();
    purged
  }

  /// Shifts anchors for `len` chars inserted at `offset`.
  pub fn map_insert(&mut self, offset: usize, len: usize) {
    if len == 0 {
      return;
    }

    for record in self.live.values_mut() {
      let moves = record.offset > offset
        || (record.offset == offset && record.movement == AnchorMovement::AfterInsertion);
      if moves {
        record.offset += len;
      }
    }
    tracing::trace!(offset, len, "mapped anchors through insert");
  }

  /// Shifts anchors for `offset..offset + len` being removed and deletes the
  /// anchors inside that range.
  ///
  /// Returns the newly deleted anchors. Every anchor shows up here at most
  /// once over its lifetime.
  pub fn map_remove(&mut self, offset: usize, len: usize) -> DeletedAnchors {
    let mut deleted = DeletedAnchors::new();
    if len == 0 {
      return deleted;
    }

    let end = offset + len;
    self.live.retain(|id, record| {
      if record.offset >= end {
        record.offset -= len;
        true
      } else if record.offset >= offset {
        deleted.push(id);
        false
      } else {
        true
      }
    });
    self.tombstones.extend(deleted.iter().copied());

    tracing::trace!(offset, len, deleted = deleted.len(), "mapped anchors through remove");
    deleted
  }
}
