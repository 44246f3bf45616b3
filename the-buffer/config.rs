use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::anchor::AnchorMovement;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid buffer config: {0}")]
  Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BufferConfig {
  /// Maximum number of undo entries kept. `0` keeps everything.
  pub undo_limit:        usize,
  /// How bookmark anchors react to text inserted exactly at their position.
  pub bookmark_movement: AnchorMovement,
  /// Maximum number of undrained document events. `0` keeps everything.
  pub event_limit:       usize,
}

impl Default for BufferConfig {
  fn default() -> Self {
    Self {
      undo_limit:        0,
      bookmark_movement: AnchorMovement::AfterInsertion,
      event_limit:       1024,
    }
  }
}

impl BufferConfig {
  pub fn from_toml(source: &str) -> Result<Self> {
    Ok(toml::from_str(source)?)
  }
}
