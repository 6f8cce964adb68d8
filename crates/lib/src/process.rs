//! Blocking subprocess invocation.
//!
//! Configure, build, and install steps run through the system shell with
//! stdout and stderr captured; the combined transcript travels with any
//! failure so the user sees what the build tool said. Exit status is the
//! sole completion signal.

use std::path::Path;
use std::process::Command;

use tracing::debug;

/// Captured result of one child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
  pub success: bool,
  pub code: Option<i32>,
  /// Combined stdout then stderr.
  pub output: String,
}

/// Run `command` through the system shell in `cwd`, capturing all output.
pub fn run_command(command: &str, cwd: &Path) -> std::io::Result<CommandOutput> {
  debug!(cmd = %command, cwd = %cwd.display(), "spawning");

  let (shell, flag) = shell_invocation();
  let out = Command::new(shell).arg(flag).arg(command).current_dir(cwd).output()?;

  let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&out.stderr);
  if !stderr.is_empty() {
    if !output.is_empty() && !output.ends_with('\n') {
      output.push('\n');
    }
    output.push_str(&stderr);
  }

  if !out.status.success() {
    debug!(code = ?out.status.code(), "command failed");
  }

  Ok(CommandOutput {
    success: out.status.success(),
    code: out.status.code(),
    output,
  })
}

/// The system shell and its command flag. Always `/bin/sh` on Unix and
/// `cmd.exe` on Windows; a user's interactive shell may source profiles
/// that change the build environment.
fn shell_invocation() -> (&'static str, &'static str) {
  #[cfg(unix)]
  {
    ("/bin/sh", "-c")
  }
  #[cfg(windows)]
  {
    ("cmd.exe", "/C")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  #[cfg(unix)]
  fn captures_stdout_and_status() {
    let out = run_command("echo hello", Path::new(".")).unwrap();
    assert!(out.success);
    assert_eq!(out.output.trim(), "hello");
  }

  #[test]
  #[cfg(unix)]
  fn captures_stderr_on_failure() {
    let out = run_command("echo oops >&2; exit 3", Path::new(".")).unwrap();
    assert!(!out.success);
    assert_eq!(out.code, Some(3));
    assert!(out.output.contains("oops"));
  }

  #[test]
  #[cfg(unix)]
  fn runs_in_the_given_directory() {
    let temp = tempfile::TempDir::new().unwrap();
    let out = run_command("pwd", temp.path()).unwrap();
    let reported = std::path::PathBuf::from(out.output.trim());
    assert_eq!(
      reported.canonicalize().unwrap(),
      temp.path().canonicalize().unwrap()
    );
  }
}
