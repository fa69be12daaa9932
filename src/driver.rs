//! Out-of-scope collaborators at their interfaces: the emitted C file on
//! disk and the C toolchain invocation. The runtime sources (`runtime.c`,
//! `runtime.h`) are expected next to the working directory, mirroring how
//! the executable links against them.

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::{CompileError, CompileResult};

/// Name of the emitted translation unit: input stem plus `.c`.
pub fn c_filename(input: &Path) -> String {
  let stem = input
    .file_stem()
    .and_then(|stem| stem.to_str())
    .unwrap_or("out");
  format!("{}.c", stem.trim())
}

/// Default executable name, derived from the input file.
pub fn default_output(input: &Path) -> String {
  input
    .file_stem()
    .and_then(|stem| stem.to_str())
    .unwrap_or("a.out")
    .trim()
    .to_string()
}

pub fn write_c_file(path: &str, contents: &str) -> CompileResult<()> {
  std::fs::write(path, contents)
    .map_err(|err| CompileError::io(format!("cannot write {path}: {err}")))
}

/// Compile the emitted C with the system toolchain, linking the runtime
/// unless the caller opted out.
pub fn build_executable(c_file: &str, output: &str, link_runtime: bool) -> CompileResult<()> {
  let mut command = Command::new("gcc");
  command.arg("-o").arg(output);
  if link_runtime {
    command.arg("runtime.c");
  }
  command.arg(c_file);
  debug!("invoking {command:?}");

  let result = command
    .output()
    .map_err(|err| CompileError::toolchain(format!("failed to invoke gcc: {err}")))?;
  if result.status.success() {
    Ok(())
  } else {
    Err(CompileError::toolchain(format!(
      "gcc failed:\n{}",
      String::from_utf8_lossy(&result.stderr)
    )))
  }
}

/// Remove the intermediate C file; emitted on success unless `-c` asked to
/// keep it. Failure to remove is not worth aborting over.
pub fn remove_c_file(path: &str) {
  let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn c_filename_swaps_the_extension() {
    assert_eq!(c_filename(Path::new("demo/fib.src")), "fib.c");
    assert_eq!(c_filename(Path::new("fib")), "fib.c");
  }

  #[test]
  fn default_output_is_the_input_stem() {
    assert_eq!(default_output(Path::new("demo/fib.src")), "fib");
  }
}
