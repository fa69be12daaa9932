//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be
//! inspected and evolved independently:
//! - `source` tracks positions and strips comments below the scanner.
//! - `scanner` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `symtab` and `typecheck` resolve names, attach types and record the
//!   implicit coercions.
//! - `optimizer` folds constants and removes dead code, preserving every
//!   observable call.
//! - `codegen` lowers the typed tree into a C translation unit.
//! - `driver` talks to the outside world: files and the C toolchain.
//! - `error` centralises reporting shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod parser;
pub mod scanner;
pub mod source;
pub mod symtab;
pub mod ty;
pub mod typecheck;

use log::debug;

pub use error::{CompileError, CompileResult};

/// Knobs of a single compilation, one per CLI switch that affects the
/// emitted C.
#[derive(Debug, Clone)]
pub struct Options {
  /// Optimisation level 0, 1 or 2.
  pub opt_level: u8,
  /// Annotate the emitted C with source line comments.
  pub verbose: bool,
  /// Pre-declare the runtime builtins (dropped by `--no-runtime`).
  pub include_runtime: bool,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      opt_level: 0,
      verbose: false,
      include_runtime: true,
    }
  }
}

/// Compile SRC source text into a C translation unit.
pub fn compile_to_c(source_text: &str, options: &Options) -> CompileResult<String> {
  let tokens = scanner::scan(source_text)?;
  debug!("scanned {} tokens", tokens.len());
  let mut program = parser::parse(tokens)?;
  let symbols = typecheck::check(&mut program, options.include_runtime)?;
  optimizer::optimize(&mut program, &symbols, options.opt_level);
  Ok(codegen::generate(&program, &symbols, options.verbose))
}
