use serde::Deserialize;

use crate::block::Blocks;

/// Index of a target inside its `Runtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub usize);

/// The stage or a sprite: something scripts run on, with its own block graph.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
  pub name: String,
  #[serde(default)]
  pub is_stage: bool,
  #[serde(default)]
  pub blocks: Blocks,
}

impl Target {
  pub fn new(name: impl Into<String>, is_stage: bool) -> Self {
    Self {
      name: name.into(),
      is_stage,
      blocks: Blocks::new(),
    }
  }

  pub fn with_blocks(mut self, blocks: Blocks) -> Self {
    self.blocks = blocks;
    self
  }
}
