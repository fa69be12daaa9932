//! Shared error utilities used across the compilation pipeline.
//!
//! Every failure is fatal: the pipeline stops at the first error and the
//! process exits with a status that encodes the error class. Diagnostics
//! carry the 1-based source line where one exists; the driver prefixes the
//! file name when reporting.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{message}"))]
  Lexical { line: u32, message: String },

  #[snafu(display("{message}"))]
  Syntax { line: u32, message: String },

  #[snafu(display("{message}"))]
  Semantic { line: u32, message: String },

  #[snafu(display("{message}"))]
  Io { message: String },

  #[snafu(display("{message}"))]
  Toolchain { message: String },
}

impl CompileError {
  pub fn lexical(line: u32, message: impl Into<String>) -> Self {
    Self::Lexical {
      line,
      message: message.into(),
    }
  }

  pub fn syntax(line: u32, message: impl Into<String>) -> Self {
    Self::Syntax {
      line,
      message: message.into(),
    }
  }

  pub fn semantic(line: u32, message: impl Into<String>) -> Self {
    Self::Semantic {
      line,
      message: message.into(),
    }
  }

  pub fn io(message: impl Into<String>) -> Self {
    Self::Io {
      message: message.into(),
    }
  }

  pub fn toolchain(message: impl Into<String>) -> Self {
    Self::Toolchain {
      message: message.into(),
    }
  }

  /// Source line the error is anchored at, if any.
  pub fn line(&self) -> Option<u32> {
    match self {
      Self::Lexical { line, .. } | Self::Syntax { line, .. } | Self::Semantic { line, .. } => {
        Some(*line)
      }
      Self::Io { .. } | Self::Toolchain { .. } => None,
    }
  }

  /// Render the single-line diagnostic: `FILE:LINE: message`.
  pub fn report(&self, filename: &str) -> String {
    match self.line() {
      Some(line) => format!("{filename}:{line}: {self}"),
      None => format!("{filename}: {self}"),
    }
  }

  /// Process exit status for this error class.
  pub fn exit_code(&self) -> i32 {
    match self {
      Self::Lexical { .. } | Self::Syntax { .. } | Self::Semantic { .. } => 1,
      Self::Io { .. } => 2,
      Self::Toolchain { .. } => 3,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_includes_file_and_line() {
    let err = CompileError::semantic(12, "duplicate declaration of x");
    assert_eq!(err.report("demo.src"), "demo.src:12: duplicate declaration of x");
    assert_eq!(err.exit_code(), 1);
  }

  #[test]
  fn io_errors_have_no_line() {
    let err = CompileError::io("cannot read source");
    assert_eq!(err.line(), None);
    assert_eq!(err.report("demo.src"), "demo.src: cannot read source");
    assert_eq!(err.exit_code(), 2);
  }

  #[test]
  fn toolchain_errors_exit_with_3() {
    assert_eq!(CompileError::toolchain("gcc failed").exit_code(), 3);
  }
}
