use std::time::Instant;

use derivative::Derivative;
use log::{debug, error, trace};

use crate::block::{Blocks, Value, PROCEDURES_CALL};
use crate::compiler::Compiler;
use crate::frame::{FrameId, StackFrame};
use crate::runtime::Runtime;
use crate::target::TargetId;

/// How many enclosing levels `is_recursive_call` looks at before giving up.
const MAX_ENCLOSING_CALLS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadStatus {
  /// Stepping from block to block.
  #[default]
  Running,
  /// A primitive is waiting on a promise; the thread resumes when it settles.
  PromiseWait,
  Yield,
  /// Yield for the rest of the current tick, cleared on resume.
  YieldTick,
  /// No more blocks to execute.
  Done,
}

/// One level of the stack. Block id, frame and target switch always move together.
#[derive(Debug)]
struct StackLevel {
  /// `None` once `go_to_next_block` walks off the end of a sequence.
  block_id: Option<String>,
  frame: FrameId,
  /// Whether pushing this level switched the active target.
  target_change: bool,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
enum Compilation<P> {
  Pending,
  Compiled(#[derivative(Debug = "ignore")] P),
  Failed,
}

/// A running script and everything needed to resume it.
///
/// When the sequencer enters a control structure it pushes the block so it
/// knows where to return to. Frames are borrowed from the runtime's frame pool
/// and handed back as levels are popped.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Thread<P> {
  top_block: String,
  levels: Vec<StackLevel>,
  target: TargetId,
  target_stack: Vec<TargetId>,
  pub status: ThreadStatus,
  /// Set by the driver; observed between steps.
  pub is_killed: bool,
  compilation: Compilation<P>,
  pub request_script_glow_in_frame: bool,
  pub block_glow_in_frame: Option<String>,
  /// Start of the current warp slice, if the thread is warping.
  pub warp_timer: Option<Instant>,
  pub just_reported: Option<Value>,
}

impl<P> Thread<P> {
  pub fn new(top_block: impl Into<String>, target: TargetId) -> Self {
    Self {
      top_block: top_block.into(),
      levels: Vec::new(),
      target,
      target_stack: Vec::new(),
      status: ThreadStatus::Running,
      is_killed: false,
      compilation: Compilation::Pending,
      request_script_glow_in_frame: false,
      block_glow_in_frame: None,
      warp_timer: None,
      just_reported: None,
    }
  }

  pub fn top_block(&self) -> &str {
    &self.top_block
  }

  pub fn target(&self) -> TargetId {
    self.target
  }

  pub fn stack_size(&self) -> usize {
    self.levels.len()
  }

  fn blocks<'r>(&self, runtime: &'r Runtime) -> Option<&'r Blocks> {
    runtime.target(self.target).map(|target| &target.blocks)
  }

  /// Push a block, switching to `target` for this level if it differs from
  /// the active one. The new frame inherits the parent frame's warp mode.
  pub fn push_stack(
    &mut self,
    runtime: &mut Runtime,
    block_id: impl Into<String>,
    target: Option<TargetId>,
  ) {
    let target_change = match target {
      Some(target) if target != self.target => {
        self.push_target(target);
        true
      }
      _ => false,
    };
    let warp_mode = self
      .levels
      .last()
      .is_some_and(|parent| runtime.frame_pool.get(parent.frame).warp_mode);
    let frame = runtime.frame_pool.create(warp_mode);
    let block_id = block_id.into();
    trace!("push {block_id} at depth {}", self.levels.len());
    self.levels.push(StackLevel {
      block_id: Some(block_id),
      frame,
      target_change,
    });
  }

  pub fn push_target(&mut self, target: TargetId) {
    trace!("switch target {:?} -> {:?}", self.target, target);
    self.target_stack.push(self.target);
    self.target = target;
  }

  /// Point the top level at the next block without churning its frame.
  pub fn reuse_stack_for_next_block(&mut self, runtime: &mut Runtime, block_id: Option<String>) {
    debug_assert!(!self.levels.is_empty(), "reuse on an empty stack");
    if let Some(level) = self.levels.last_mut() {
      level.block_id = block_id;
      runtime.frame_pool.get_mut(level.frame).reuse();
    }
  }

  /// Pop the top level, hand its frame back to the pool and restore the
  /// previous target if this level switched it.
  pub fn pop_stack(&mut self, runtime: &mut Runtime) -> Option<String> {
    let level = self.levels.pop()?;
    trace!("pop {:?} at depth {}", level.block_id, self.levels.len());
    runtime.frame_pool.release(level.frame);
    if level.target_change {
      self.pop_target();
    }
    level.block_id
  }

  pub fn pop_target(&mut self) -> TargetId {
    match self.target_stack.pop() {
      Some(target) => {
        trace!("restore target {:?} -> {:?}", self.target, target);
        self.target = target;
      }
      None => debug_assert!(false, "pop_target without a matching push_target"),
    }
    self.target
  }

  /// Unwind until the stack is empty, a reporter is pending, or a procedure
  /// call is reached. A call is treated as finished and moved past.
  pub fn stop_this_script(&mut self, runtime: &mut Runtime) {
    while let Some(level) = self.levels.last() {
      if runtime.frame_pool.get(level.frame).waiting_reporter {
        break;
      }
      let is_call = level
        .block_id
        .as_deref()
        .and_then(|id| self.blocks(runtime)?.get_block(id))
        .is_some_and(|block| block.opcode == PROCEDURES_CALL);
      if is_call {
        self.go_to_next_block(runtime);
        break;
      }
      self.pop_stack(runtime);
    }

    if self.levels.is_empty() {
      self.request_script_glow_in_frame = false;
      self.status = ThreadStatus::Done;
    }
  }

  pub fn peek_stack(&self) -> Option<&str> {
    self.levels.last()?.block_id.as_deref()
  }

  pub fn peek_stack_frame<'r>(&self, runtime: &'r Runtime) -> Option<&'r StackFrame> {
    let level = self.levels.last()?;
    Some(runtime.frame_pool.get(level.frame))
  }

  pub fn peek_stack_frame_mut<'r>(&self, runtime: &'r mut Runtime) -> Option<&'r mut StackFrame> {
    let level = self.levels.last()?;
    Some(runtime.frame_pool.get_mut(level.frame))
  }

  pub fn peek_parent_stack_frame<'r>(&self, runtime: &'r Runtime) -> Option<&'r StackFrame> {
    let level = self.levels.iter().rev().nth(1)?;
    Some(runtime.frame_pool.get(level.frame))
  }

  /// The caller's target, once at least two targets have been stacked.
  pub fn peek_target(&self) -> Option<TargetId> {
    if self.target_stack.len() > 1 {
      self.target_stack.last().copied()
    } else {
      None
    }
  }

  pub fn push_reported_value(&mut self, value: Option<Value>) {
    self.just_reported = value;
  }

  pub fn init_params(&self, runtime: &mut Runtime) {
    if let Some(frame) = self.peek_stack_frame_mut(runtime) {
      frame.params.get_or_insert_with(Default::default);
    }
  }

  /// Call `init_params` first.
  pub fn push_param(&self, runtime: &mut Runtime, name: impl Into<String>, value: Value) {
    if let Some(frame) = self.peek_stack_frame_mut(runtime) {
      debug_assert!(frame.params.is_some(), "push_param before init_params");
      frame
        .params
        .get_or_insert_with(Default::default)
        .insert(name.into(), value);
    }
  }

  /// Look a parameter up in the nearest enclosing frame that has parameters.
  ///
  /// The top frame is skipped, and the search stops at the first frame with
  /// parameters even when `name` is not among them.
  pub fn get_param<'r>(&self, runtime: &'r Runtime, name: &str) -> Option<&'r Value> {
    let below_top = self.levels.len().saturating_sub(1);
    self.levels[..below_top]
      .iter()
      .rev()
      .find_map(|level| runtime.frame_pool.get(level.frame).params.as_ref())
      .and_then(|params| params.get(name))
  }

  pub fn at_stack_top(&self) -> bool {
    self.peek_stack() == Some(self.top_block.as_str())
  }

  /// Move the top level on to the next block in the sequence.
  pub fn go_to_next_block(&mut self, runtime: &mut Runtime) {
    let next = self
      .peek_stack()
      .and_then(|id| self.blocks(runtime)?.get_next_block(id))
      .map(str::to_owned);
    self.reuse_stack_for_next_block(runtime, next);
  }

  /// Guess whether calling `procedure_code` now would recurse, by looking for
  /// a call to it among the nearest enclosing levels.
  ///
  /// A level waiting on a reporter is examined twice: first the reporter it
  /// waits on, then its own block. Blocks that cannot be found in any target
  /// end the search with `false`.
  pub fn is_recursive_call(&self, runtime: &Runtime, procedure_code: &str) -> bool {
    let mut remaining = MAX_ENCLOSING_CALLS;
    let mut level = self.levels.len().saturating_sub(1);
    let mut reporter_checked = false;
    while level > 0 {
      let index = level - 1;
      let frame = runtime.frame_pool.get(self.levels[index].frame);
      let block_id = if !reporter_checked && frame.waiting_reporter {
        reporter_checked = true;
        frame.reporting.as_deref()
      } else {
        reporter_checked = false;
        level -= 1;
        self.levels[index].block_id.as_deref()
      };
      let Some(block) = block_id.and_then(|id| runtime.resolve_block(self.target, id)) else {
        return false;
      };
      if block.is_procedure_call() && block.proccode() == Some(procedure_code) {
        return true;
      }
      remaining -= 1;
      if remaining == 0 {
        return false;
      }
    }
    false
  }

  pub fn is_compiled(&self) -> bool {
    matches!(self.compilation, Compilation::Compiled(_))
  }

  pub fn compiled_stack(&self) -> Option<&P> {
    match &self.compilation {
      Compilation::Compiled(program) => Some(program),
      _ => None,
    }
  }

  /// Compile the script once. On failure the thread stays interpreted for
  /// good; later calls do nothing.
  pub fn compile<C, F>(&mut self, runtime: &Runtime, new_compiler: F)
  where
    C: Compiler<Program = P>,
    F: FnOnce(&Self) -> C,
  {
    if !matches!(self.compilation, Compilation::Pending) {
      return;
    }
    let mut compiler = new_compiler(self);
    self.compilation = match compiler.generate_stack(runtime, &self.top_block) {
      Ok(program) => {
        debug!("compiled script {}", self.top_block);
        Compilation::Compiled(program)
      }
      Err(e) => {
        error!("error occurred during compilation of script {}: {e}", self.top_block);
        Compilation::Failed
      }
    };
  }
}
