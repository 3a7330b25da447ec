//! Running a single invocation.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::sandbox::SandboxEnv;
use crate::formula::Invocation;

#[derive(Debug, Error)]
pub enum StepError {
  #[error("failed to spawn `{program}`: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("`{program}` timed out after {}", humantime::format_duration(*timeout))]
  TimedOut { program: String, timeout: Duration },

  #[error("failed waiting for `{program}`: {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct StepOutput {
  /// Exit code, `None` when terminated by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

impl StepOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Run `invocation` in `cwd` with exactly `env` as its environment.
///
/// The child is killed if it outlives `timeout`.
pub async fn run_invocation(
  invocation: &Invocation,
  cwd: &Path,
  env: &SandboxEnv,
  timeout: Duration,
) -> Result<StepOutput, StepError> {
  debug!(step = %invocation, cwd = %cwd.display(), "spawning process");

  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .current_dir(cwd)
    .env_clear()
    .envs(env.iter())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  let started = Instant::now();
  let child = command.spawn().map_err(|source| StepError::Spawn {
    program: invocation.program.clone(),
    source,
  })?;

  let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
    Ok(Ok(output)) => output,
    Ok(Err(source)) => {
      return Err(StepError::Wait {
        program: invocation.program.clone(),
        source,
      });
    }
    // Dropping the future drops the child, which kills it
    Err(_) => {
      return Err(StepError::TimedOut {
        program: invocation.program.clone(),
        timeout,
      });
    }
  };

  let output = StepOutput {
    code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    duration: started.elapsed(),
  };

  if !output.stdout.is_empty() {
    debug!(stdout = %output.stdout.trim_end(), "process stdout");
  }
  if !output.stderr.is_empty() {
    debug!(stderr = %output.stderr.trim_end(), "process stderr");
  }

  Ok(output)
}

/// The last `max` bytes of `s`, cut at a char boundary.
pub fn tail(s: &str, max: usize) -> &str {
  if s.len() <= max {
    return s;
  }
  let mut start = s.len() - max;
  while !s.is_char_boundary(start) {
    start += 1;
  }
  &s[start..]
}
