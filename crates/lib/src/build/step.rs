//! Step execution.
//!
//! Each step is one opaque command string run through a shell with a fully
//! specified environment: the process environment is cleared first, so steps
//! see only what the build context hands them.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Captured result of one step.
#[derive(Debug, Clone)]
pub struct StepOutput {
  /// `None` when the process was killed by a signal.
  pub exit_status: Option<i32>,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

/// Lines of stderr kept in the failure log.
const STDERR_TAIL: usize = 20;

/// Run `cmd` in `cwd` with exactly `env`.
///
/// The working directory is created if missing. Only a failure to spawn is
/// an error; a non-zero exit is reported through [`StepOutput`].
pub async fn execute_step(
  cmd: &str,
  env: &BTreeMap<String, String>,
  cwd: &Path,
  shell: Option<&str>,
) -> io::Result<StepOutput> {
  info!(cmd = %first_line(cmd), "executing step");

  tokio::fs::create_dir_all(cwd).await?;

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .envs(env)
    .stdin(std::process::Stdio::null())
    .kill_on_drop(true);

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");

  let output = command.output().await?;
  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if !stdout.trim().is_empty() {
    debug!(stdout = %stdout.trim_end(), "step stdout");
  }

  if !output.status.success() {
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n");
    warn!(code = ?output.status.code(), stderr = %tail, "step failed");
  } else if !stderr.trim().is_empty() {
    debug!(stderr = %stderr.trim_end(), "step stderr");
  }

  Ok(StepOutput {
    exit_status: output.status.code(),
    success: output.status.success(),
    stdout,
    stderr,
  })
}

fn first_line(cmd: &str) -> &str {
  cmd.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// Shell command and the argument that introduces the command string.
///
/// Defaults to `/bin/sh` rather than `$SHELL`, which may source profile
/// files that change the environment.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  match override_shell {
    Some(shell) => (shell.to_string(), vec!["-c".to_string()]),
    None => ("/bin/sh".to_string(), vec!["-c".to_string()]),
  }
}
