use std::time::Duration;

use crate::block::Block;
use crate::frame::FramePool;
use crate::target::{Target, TargetId};

#[derive(Debug, Clone)]
pub struct Config {
  pub frame_rate: u32,
  /// How long all threads together may step in one frame.
  pub work_time: Duration,
  /// How long a warp-mode thread may run before it is forced to yield.
  pub warp_time: Duration,
  pub compile_scripts: bool,
}

impl Config {
  /// The work budget is three quarters of a frame at `frame_rate`.
  pub fn with_frame_rate(frame_rate: u32) -> Self {
    let frame_rate = frame_rate.max(1);
    Self {
      frame_rate,
      work_time: Duration::from_secs(3) / frame_rate.saturating_mul(4),
      warp_time: Duration::from_millis(500),
      compile_scripts: false,
    }
  }

  pub fn frame_time(&self) -> Duration {
    Duration::from_secs(1) / self.frame_rate.max(1)
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::with_frame_rate(30)
  }
}

/// Everything threads of one engine share: targets and the frame pool.
#[derive(Debug, Default)]
pub struct Runtime {
  pub config: Config,
  pub frame_pool: FramePool,
  targets: Vec<Target>,
}

impl Runtime {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      frame_pool: FramePool::new(),
      targets: Vec::new(),
    }
  }

  pub fn add_target(&mut self, target: Target) -> TargetId {
    self.targets.push(target);
    TargetId(self.targets.len() - 1)
  }

  pub fn target(&self, id: TargetId) -> Option<&Target> {
    self.targets.get(id.0)
  }

  pub fn target_mut(&mut self, id: TargetId) -> Option<&mut Target> {
    self.targets.get_mut(id.0)
  }

  pub fn targets(&self) -> &[Target] {
    &self.targets
  }

  pub fn target_by_name(&self, name: &str) -> Option<TargetId> {
    self
      .targets
      .iter()
      .position(|target| target.name == name)
      .map(TargetId)
  }

  /// Look a block up in `preferred` first, then in every target in order.
  pub fn resolve_block(&self, preferred: TargetId, id: &str) -> Option<&Block> {
    self
      .target(preferred)
      .and_then(|target| target.blocks.get_block(id))
      .or_else(|| {
        self
          .targets
          .iter()
          .find_map(|target| target.blocks.get_block(id))
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{Block, Blocks};

  #[test]
  fn resolve_block_falls_back_to_other_targets() {
    let mut runtime = Runtime::default();
    let mut stage_blocks = Blocks::new();
    stage_blocks.create_block("shared", Block::new("looks_say"));
    let stage = runtime.add_target(Target::new("Stage", true).with_blocks(stage_blocks));
    let mut sprite_blocks = Blocks::new();
    sprite_blocks.create_block("own", Block::new("motion_movesteps"));
    let sprite = runtime.add_target(Target::new("Sprite1", false).with_blocks(sprite_blocks));

    assert_eq!(runtime.resolve_block(sprite, "own").unwrap().opcode, "motion_movesteps");
    assert_eq!(runtime.resolve_block(sprite, "shared").unwrap().opcode, "looks_say");
    assert!(runtime.resolve_block(stage, "missing").is_none());
    assert_eq!(runtime.target_by_name("Sprite1"), Some(sprite));
  }

  #[test]
  fn work_budget_follows_frame_rate() {
    let config = Config::with_frame_rate(60);
    assert_eq!(config.frame_time(), Duration::from_secs(1) / 60);
    assert_eq!(config.work_time, Duration::from_micros(12_500));
    assert_eq!(Config::default().work_time, Duration::from_secs(1) / 40);
    assert_eq!(Config::with_frame_rate(0).frame_rate, 1);
  }
}
