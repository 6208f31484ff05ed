use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use blockthread::{
  CompileError, Compiler, Config, Input, Project, Runtime, TargetId, Thread, ThreadStatus,
};
use clap::Parser;
use log::{info, warn};

/// Straight-line scripts compile to the list of block ids they run.
type Program = Vec<String>;

#[derive(Debug, Parser)]
#[command(about = "Run the green flag scripts of an extracted project.json")]
struct Args {
  project: PathBuf,
  #[arg(long, default_value_t = 30)]
  frame_rate: u32,
  /// Compile scripts that have no control flow.
  #[arg(long)]
  compile: bool,
  #[arg(long)]
  max_frames: Option<u32>,
}

struct ScriptCompiler {
  target: TargetId,
}

impl Compiler for ScriptCompiler {
  type Program = Program;

  fn generate_stack(&mut self, runtime: &Runtime, top_block: &str) -> Result<Program, CompileError> {
    let mut program = Vec::new();
    let mut id = Some(top_block.to_string());
    while let Some(block_id) = id {
      let block = runtime
        .resolve_block(self.target, &block_id)
        .ok_or_else(|| CompileError::MissingBlock(block_id.clone()))?;
      if block.inputs.contains_key("SUBSTACK") || block.opcode.starts_with("procedures_") {
        return Err(CompileError::UnsupportedOpcode {
          block: block_id,
          opcode: block.opcode.clone(),
        });
      }
      id = block.next.clone();
      program.push(block_id);
    }
    Ok(program)
  }
}

fn start_scripts(runtime: &mut Runtime) -> Vec<Thread<Program>> {
  let mut hats = Vec::new();
  for (index, target) in runtime.targets().iter().enumerate() {
    for (id, block) in target.blocks.iter() {
      if block.opcode == "event_whenflagclicked" {
        hats.push((id.to_string(), TargetId(index)));
      }
    }
  }
  let mut threads = Vec::with_capacity(hats.len());
  for (id, target) in hats {
    let mut thread = Thread::new(id.clone(), target);
    thread.push_stack(runtime, id, None);
    thread.request_script_glow_in_frame = true;
    if runtime.config.compile_scripts {
      thread.compile(runtime, |thread| ScriptCompiler {
        target: thread.target(),
      });
    }
    threads.push(thread);
  }
  threads
}

fn substack_of(runtime: &Runtime, target: TargetId, id: &str) -> Option<String> {
  let block = runtime.resolve_block(target, id)?;
  block.inputs.get("SUBSTACK")?.block_id().map(str::to_owned)
}

/// The first block of the definition of `proccode` in `target`.
fn procedure_body(runtime: &Runtime, target: TargetId, proccode: &str) -> Option<String> {
  let blocks = &runtime.target(target)?.blocks;
  blocks
    .iter()
    .filter(|(_, block)| block.opcode == "procedures_definition")
    .find(|(_, block)| {
      block
        .inputs
        .get("custom_block")
        .and_then(Input::block_id)
        .and_then(|prototype| blocks.get_block(prototype))
        .and_then(|prototype| prototype.proccode())
        == Some(proccode)
    })
    .and_then(|(_, definition)| definition.next.clone())
}

/// Whether a warping thread has used up its time slice.
fn should_yield(runtime: &Runtime, thread: &mut Thread<Program>) -> bool {
  let warp_mode = thread
    .peek_stack_frame(runtime)
    .is_some_and(|frame| frame.warp_mode);
  if !warp_mode {
    return true;
  }
  let started = *thread.warp_timer.get_or_insert_with(Instant::now);
  started.elapsed() >= runtime.config.warp_time
}

/// What a `control_stop` block asks of the threads other than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopRequest {
  All,
  OtherScripts(TargetId),
}

/// Unwind every level, procedure calls included.
fn kill(runtime: &mut Runtime, thread: &mut Thread<Program>) {
  while thread.stack_size() > 0 {
    thread.pop_stack(runtime);
  }
  thread.stop_this_script(runtime);
}

fn execute_block(
  runtime: &mut Runtime,
  thread: &mut Thread<Program>,
  id: String,
) -> Option<StopRequest> {
  let target = thread.target();
  let Some(block) = runtime.resolve_block(target, &id) else {
    warn!("block {id} does not exist, stopping script {}", thread.top_block());
    thread.stop_this_script(runtime);
    return None;
  };
  let opcode = block.opcode.clone();
  let proccode = block.proccode().map(str::to_owned);
  let warp = block.mutation.as_ref().is_some_and(|mutation| mutation.is_warp());
  let stop_option = block
    .fields
    .get("STOP_OPTION")
    .map(|field| field.value.to_string());
  info!("{}: {opcode}", runtime.target(target).map_or("?", |t| t.name.as_str()));
  thread.block_glow_in_frame = Some(id.clone());

  match opcode.as_str() {
    "control_stop" => match stop_option.as_deref() {
      Some("all") => {
        kill(runtime, thread);
        return Some(StopRequest::All);
      }
      Some("other scripts in sprite" | "other scripts in stage") => {
        thread.go_to_next_block(runtime);
        return Some(StopRequest::OtherScripts(target));
      }
      _ => thread.stop_this_script(runtime),
    },
    "control_forever" => {
      if let Some(frame) = thread.peek_stack_frame_mut(runtime) {
        frame.is_loop = true;
      }
      match substack_of(runtime, target, &id) {
        Some(body) => thread.push_stack(runtime, body, None),
        None => thread.status = ThreadStatus::Yield,
      }
    }
    "procedures_call" => {
      let body = proccode
        .as_deref()
        .and_then(|proccode| procedure_body(runtime, target, proccode));
      let Some(body) = body else {
        thread.go_to_next_block(runtime);
        return None;
      };
      let recursive = proccode
        .as_deref()
        .is_some_and(|proccode| thread.is_recursive_call(runtime, proccode));
      thread.init_params(runtime);
      thread.push_stack(runtime, body, None);
      if warp {
        if let Some(frame) = thread.peek_stack_frame_mut(runtime) {
          frame.warp_mode = true;
        }
      }
      if recursive && should_yield(runtime, thread) {
        thread.warp_timer = None;
        thread.status = ThreadStatus::Yield;
      }
    }
    _ => match substack_of(runtime, target, &id) {
      Some(body) => thread.push_stack(runtime, body, None),
      None => thread.go_to_next_block(runtime),
    },
  }
  None
}

/// Run the block on top of the stack, or unwind once if the top level fell
/// off the end of its sequence.
fn step_block(runtime: &mut Runtime, thread: &mut Thread<Program>) -> Option<StopRequest> {
  if let Some(id) = thread.peek_stack().map(str::to_owned) {
    return execute_block(runtime, thread, id);
  }
  thread.pop_stack(runtime);
  let Some(parent) = thread.peek_stack().map(str::to_owned) else {
    thread.stop_this_script(runtime);
    return None;
  };
  let is_loop = thread
    .peek_stack_frame(runtime)
    .is_some_and(|frame| frame.is_loop);
  if !is_loop {
    thread.go_to_next_block(runtime);
    return None;
  }
  if let Some(body) = substack_of(runtime, thread.target(), &parent) {
    thread.push_stack(runtime, body, None);
  }
  if should_yield(runtime, thread) {
    thread.warp_timer = None;
    thread.status = ThreadStatus::Yield;
  }
  None
}

/// Warp-mode code runs until its warp slice is used up, everything else
/// until the frame's work budget is.
fn out_of_time(runtime: &Runtime, thread: &mut Thread<Program>, deadline: Instant) -> bool {
  let warp_mode = thread
    .peek_stack_frame(runtime)
    .is_some_and(|frame| frame.warp_mode);
  if warp_mode {
    return should_yield(runtime, thread);
  }
  thread.warp_timer = None;
  Instant::now() >= deadline
}

fn step_thread(
  runtime: &mut Runtime,
  thread: &mut Thread<Program>,
  deadline: Instant,
) -> Option<StopRequest> {
  if thread.is_killed {
    kill(runtime, thread);
    return None;
  }
  if matches!(thread.status, ThreadStatus::Yield | ThreadStatus::YieldTick) {
    thread.status = ThreadStatus::Running;
  }
  if let Some(program) = thread.compiled_stack() {
    for id in program {
      if let Some(block) = runtime.resolve_block(thread.target(), id) {
        info!("compiled {}: {}", thread.top_block(), block.opcode);
      }
    }
    thread.stop_this_script(runtime);
    return None;
  }
  let mut request = None;
  while thread.status == ThreadStatus::Running {
    if let Some(stop) = step_block(runtime, thread) {
      request = Some(stop);
    }
    if thread.status == ThreadStatus::Running && out_of_time(runtime, thread, deadline) {
      thread.warp_timer = None;
      thread.status = ThreadStatus::Yield;
    }
  }
  request
}

fn step_all_scripts(runtime: &mut Runtime, threads: &mut Vec<Thread<Program>>) {
  let deadline = Instant::now() + runtime.config.work_time;
  for index in 0..threads.len() {
    let Some(request) = step_thread(runtime, &mut threads[index], deadline) else {
      continue;
    };
    for (other, thread) in threads.iter_mut().enumerate() {
      let stopped = match request {
        StopRequest::All => true,
        StopRequest::OtherScripts(target) => thread.target() == target,
      };
      if other != index && stopped {
        thread.is_killed = true;
      }
    }
  }
  threads.retain(|thread| thread.status != ThreadStatus::Done);
}

fn main() -> anyhow::Result<()> {
  pretty_env_logger::init();
  let args = Args::parse();
  let config = Config {
    compile_scripts: args.compile,
    ..Config::with_frame_rate(args.frame_rate)
  };
  let project = Project::load(&args.project)
    .with_context(|| format!("failed to load {}", args.project.display()))?;
  let mut runtime = project.into_runtime(config);
  let mut threads = start_scripts(&mut runtime);
  info!("started {} scripts", threads.len());

  let frame_time = runtime.config.frame_time();
  let mut frames = 0;
  while !threads.is_empty() && args.max_frames.map_or(true, |max| frames < max) {
    let started = Instant::now();
    step_all_scripts(&mut runtime, &mut threads);
    frames += 1;
    if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
      std::thread::sleep(rest);
    }
  }
  info!(
    "stopped after {frames} frames, {} scripts still running, {} stack frames allocated",
    threads.len(),
    runtime.frame_pool.capacity()
  );
  Ok(())
}
