//! Text document core for an editor buffer: position tracking anchors,
//! bookmarks that follow edits, and a replayable undo history.

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod anchor;
pub mod bookmark;
pub mod config;
pub mod document;
pub mod position;
pub mod undo;
pub mod update;

pub type Tendril = SmartString<LazyCompact>;
