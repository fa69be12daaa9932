//! CLI tests: spawn the compiled binary and observe its exit codes, its
//! diagnostics and the C file it leaves behind. All runs use `-c` so the
//! tests never depend on a host C toolchain.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn workdir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("srcc-cli-{name}-{}", std::process::id()));
  let _ = fs::remove_dir_all(&dir);
  fs::create_dir_all(&dir).expect("failed to create scratch directory");
  dir
}

fn run_compiler(name: &str, source: &str, extra: &[&str]) -> (Output, PathBuf) {
  let dir = workdir(name);
  fs::write(dir.join("prog.src"), source).expect("failed to write source file");
  let out = Command::new(env!("CARGO_BIN_EXE_srcc"))
    .current_dir(&dir)
    .args(extra)
    .arg("-c")
    .arg("prog.src")
    .output()
    .expect("failed to spawn the compiler");
  (out, dir)
}

#[test]
fn valid_programs_emit_a_c_file_and_exit_zero() {
  let (out, dir) = run_compiler(
    "ok",
    "program p is begin putInteger(1+2*3); return; end program",
    &[],
  );
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let c = fs::read_to_string(dir.join("prog.c")).expect("prog.c must exist");
  assert!(c.contains("#include \"runtime.h\""));
  assert!(c.contains("putInteger"));
}

#[test]
fn compile_errors_exit_one_with_a_file_line_diagnostic() {
  let (out, dir) = run_compiler(
    "type-error",
    "program p is\nint x;\nbegin\nx := \"oops\";\nend program",
    &[],
  );
  assert_eq!(out.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&out.stderr);
  assert!(stderr.contains("prog.src:4:"), "stderr: {stderr}");
  assert!(!dir.join("prog.c").exists(), "no output on failure");
}

#[test]
fn lexical_errors_exit_one() {
  let (out, _dir) = run_compiler(
    "lex-error",
    "program p is begin putString(\"hi); end program",
    &[],
  );
  assert_eq!(out.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&out.stderr);
  assert!(stderr.contains("unterminated string"), "stderr: {stderr}");
}

#[test]
fn missing_input_files_exit_two() {
  let dir = workdir("missing");
  let out = Command::new(env!("CARGO_BIN_EXE_srcc"))
    .current_dir(&dir)
    .arg("-c")
    .arg("nowhere.src")
    .output()
    .expect("failed to spawn the compiler");
  assert_eq!(out.status.code(), Some(2));
  let stderr = String::from_utf8_lossy(&out.stderr);
  assert!(stderr.contains("cannot read source"), "stderr: {stderr}");
}

#[test]
fn invalid_optimisation_levels_exit_two() {
  let (out, _dir) = run_compiler("bad-level", "program p is begin end program", &["-O", "9"]);
  assert_eq!(out.status.code(), Some(2));
}

#[test]
fn optimisation_level_one_removes_constant_branches() {
  let (out, dir) = run_compiler(
    "fold",
    "program p is begin if (1 == 1) then putInteger(1); else putInteger(2); end if; end program",
    &["-O", "1"],
  );
  assert!(out.status.success());
  let c = fs::read_to_string(dir.join("prog.c")).unwrap();
  assert!(!c.contains("if ("), "got:\n{c}");
  assert!(c.contains("putInteger(1);"));
}

#[test]
fn verbose_mode_annotates_the_emitted_c() {
  let (out, dir) = run_compiler(
    "verbose",
    "program p is\nint x;\nbegin\nx := 1;\nend program",
    &["-v"],
  );
  assert!(out.status.success());
  let c = fs::read_to_string(dir.join("prog.c")).unwrap();
  assert!(c.contains("/* line 4 */"), "got:\n{c}");
}

#[test]
fn dump_tokens_prints_the_stream() {
  let (out, _dir) = run_compiler(
    "dump",
    "program p is begin end program",
    &["--dump-tokens"],
  );
  assert!(out.status.success());
  let stdout = String::from_utf8_lossy(&out.stdout);
  assert!(stdout.contains("Program"), "stdout: {stdout}");
  assert!(stdout.contains("Eof"), "stdout: {stdout}");
}

#[test]
fn help_prints_usage_and_exits_zero() {
  let out = Command::new(env!("CARGO_BIN_EXE_srcc"))
    .arg("-h")
    .output()
    .expect("failed to spawn the compiler");
  assert!(out.status.success());
  let stdout = String::from_utf8_lossy(&out.stdout);
  assert!(stdout.contains("Usage:"), "stdout: {stdout}");
  assert!(stdout.contains("--no-runtime"), "stdout: {stdout}");
}
