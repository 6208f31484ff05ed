use std::any::Any;
use std::collections::HashMap;

use crate::block::Value;

/// Metadata for one level of a thread's stack.
#[derive(Debug, Default)]
pub struct StackFrame {
  /// Whether this level of the stack is a loop.
  pub is_loop: bool,
  /// Set by warp-mode custom blocks and turbo mode. Inherited by nested levels.
  pub warp_mode: bool,
  /// Value reported by the block that just finished at this level.
  pub just_reported: Option<Value>,
  /// The reporter block waiting on a promise.
  pub reporting: Option<String>,
  /// Reported inputs kept alive across an asynchronous block.
  pub reported: Option<HashMap<String, Value>>,
  pub waiting_reporter: bool,
  /// Procedure parameters, created on demand by `Thread::init_params`.
  pub params: Option<HashMap<String, Value>>,
  /// Opaque state owned by the executing primitive.
  pub execution_context: Option<Box<dyn Any>>,
}

impl StackFrame {
  pub fn new(warp_mode: bool) -> Self {
    Self {
      warp_mode,
      ..Default::default()
    }
  }

  pub fn reset(&mut self) -> &mut Self {
    *self = Self::default();
    self
  }

  /// Reset for the next block at the same level, keeping the warp mode.
  pub fn reuse(&mut self) -> &mut Self {
    let warp_mode = self.warp_mode;
    self.reuse_with(warp_mode)
  }

  pub fn reuse_with(&mut self, warp_mode: bool) -> &mut Self {
    self.reset();
    self.warp_mode = warp_mode;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

/// Recycles stack frames so pushing a level does not allocate.
///
/// Frames live in `frames` forever and are addressed by `FrameId`. A frame is
/// either held by exactly one thread level or listed in `free`; `in_use` has
/// one flag per slot saying which.
#[derive(Debug, Default)]
pub struct FramePool {
  frames: Vec<StackFrame>,
  in_use: Vec<bool>,
  free: Vec<FrameId>,
}

impl FramePool {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn create(&mut self, warp_mode: bool) -> FrameId {
    if let Some(id) = self.free.pop() {
      // Already reset on release.
      self.frames[id.0].warp_mode = warp_mode;
      self.in_use[id.0] = true;
      return id;
    }
    self.frames.push(StackFrame::new(warp_mode));
    self.in_use.push(true);
    FrameId(self.frames.len() - 1)
  }

  pub fn release(&mut self, id: FrameId) {
    debug_assert!(self.in_use[id.0], "stack frame {id:?} released twice");
    self.in_use[id.0] = false;
    self.frames[id.0].reset();
    self.free.push(id);
  }

  pub fn is_in_use(&self, id: FrameId) -> bool {
    self.in_use.get(id.0).copied().unwrap_or(false)
  }

  pub fn get(&self, id: FrameId) -> &StackFrame {
    &self.frames[id.0]
  }

  pub fn get_mut(&mut self, id: FrameId) -> &mut StackFrame {
    &mut self.frames[id.0]
  }

  /// Frames ever allocated, in use or not.
  pub fn capacity(&self) -> usize {
    self.frames.len()
  }

  pub fn free_count(&self) -> usize {
    self.free.len()
  }

  pub fn in_use(&self) -> usize {
    self.frames.len() - self.free.len()
  }
}
