use thiserror::Error;

use crate::runtime::Runtime;

#[derive(Debug, Error)]
pub enum CompileError {
  #[error("block {0} does not exist")]
  MissingBlock(String),
  #[error("opcode {opcode} of block {block} cannot be compiled")]
  UnsupportedOpcode { block: String, opcode: String },
  #[error("{0}")]
  Other(String),
}

/// Turns a script into a program that runs without walking the block graph.
///
/// A compiler is built against the thread that asks for it, see `Thread::compile`.
pub trait Compiler {
  type Program;

  fn generate_stack(
    &mut self,
    runtime: &Runtime,
    top_block: &str,
  ) -> Result<Self::Program, CompileError>;
}
