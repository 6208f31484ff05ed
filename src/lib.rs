//! Per-script execution state for a block-based program runner.
//!
//! A [`Thread`] walks a target's block graph as a stack of nested blocks. The
//! driver that decides when each thread runs lives outside this crate; it
//! calls the thread's stack operations and reads [`ThreadStatus`] back.

pub mod block;
pub mod compiler;
pub mod frame;
pub mod input;
pub mod project;
pub mod runtime;
pub mod target;
pub mod thread;

pub use block::{Block, Blocks, Value};
pub use compiler::{CompileError, Compiler};
pub use frame::{FrameId, FramePool, StackFrame};
pub use input::Input;
pub use project::{Project, ProjectError};
pub use runtime::{Config, Runtime};
pub use target::{Target, TargetId};
pub use thread::{Thread, ThreadStatus};
