//! Install execution.
//!
//! This module runs a formula's install procedure against its verified
//! artifact. It handles:
//! - staging the artifact into a fresh sandbox
//! - running the install steps in order with a bounded environment
//! - stopping at the first failing or timed-out step
//! - removing the partially populated prefix on failure

pub mod sandbox;
pub mod stage;
pub mod step;

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::consts::STDERR_TAIL_BYTES;
use crate::formula::Formula;
use crate::formula::placeholder::{PlaceholderError, PlaceholderValues};
use crate::platform::paths::data_dir;

pub use sandbox::{Sandbox, SandboxEnv, SandboxOptions};
pub use stage::StageError;
pub use step::{StepError, StepOutput, run_invocation, tail};

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("install step {index} `{step}` exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
  StepFailed {
    index: usize,
    step: String,
    code: Option<i32>,
    /// Tail of the step's stderr.
    stderr: String,
  },

  #[error("install step {index} `{step}` timed out after {}", humantime::format_duration(*timeout))]
  TimedOut {
    index: usize,
    step: String,
    timeout: Duration,
  },

  #[error("install step {index} `{step}` could not run: {source}")]
  Step {
    index: usize,
    step: String,
    #[source]
    source: StepError,
  },

  #[error("install step {index}: {source}")]
  Placeholder {
    index: usize,
    #[source]
    source: PlaceholderError,
  },

  #[error("refusing to install {formula} outside the cellar: `{segment}` is not a plain directory name")]
  UnsafePrefix { formula: String, segment: String },

  #[error(transparent)]
  Stage(#[from] StageError),

  #[error("failed to prepare {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
  /// Installed formulas live under `<cellar>/<name>/<version>`.
  pub cellar: PathBuf,
  pub sandbox: SandboxOptions,
}

impl Default for InstallOptions {
  fn default() -> Self {
    Self {
      cellar: data_dir().join("cellar"),
      sandbox: SandboxOptions::default(),
    }
  }
}

/// Record of one executed install step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
  pub step: String,
  pub code: Option<i32>,
  #[serde(with = "duration_ms")]
  pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
  pub formula: String,
  pub version: String,
  pub prefix: PathBuf,
  pub steps: Vec<StepRecord>,
}

pub struct Installer {
  options: InstallOptions,
}

impl Installer {
  pub fn new(options: InstallOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &InstallOptions {
    &self.options
  }

  /// Install target directory of `formula`.
  ///
  /// Name and version must each be one plain path segment, so the prefix
  /// always lies inside the cellar.
  pub fn prefix_for(&self, formula: &Formula) -> Result<PathBuf, InstallError> {
    for segment in [&formula.name, &formula.version] {
      if !is_plain_segment(segment) {
        return Err(InstallError::UnsafePrefix {
          formula: formula.name.clone(),
          segment: segment.clone(),
        });
      }
    }
    Ok(self.options.cellar.join(&formula.name).join(&formula.version))
  }

  /// Run the install procedure of `formula` against the verified `artifact`.
  ///
  /// On failure the prefix is removed again.
  pub async fn install(&self, formula: &Formula, artifact: &Path) -> Result<InstallReport, InstallError> {
    let prefix = self.prefix_for(formula)?;
    info!(formula = %formula.name, version = %formula.version, prefix = %prefix.display(), "installing");

    let result = self.install_into(formula, artifact, &prefix).await;
    if let Err(e) = &result {
      error!(formula = %formula.name, error = %e, "install failed");
      remove_prefix(&prefix).await;
    }
    result
  }

  async fn install_into(&self, formula: &Formula, artifact: &Path, prefix: &Path) -> Result<InstallReport, InstallError> {
    let io_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source| InstallError::Io { path, source }
    };

    // A leftover prefix from an interrupted run must not leak into this one
    if tokio::fs::try_exists(prefix).await.unwrap_or(false) {
      debug!(prefix = %prefix.display(), "removing stale prefix");
      tokio::fs::remove_dir_all(prefix).await.map_err(io_err(prefix))?;
    }
    tokio::fs::create_dir_all(prefix).await.map_err(io_err(prefix))?;

    let sandbox_opts = &self.options.sandbox;
    let sandbox = Sandbox::create(sandbox_opts, &formula.name).map_err(io_err(&sandbox_opts.work_root))?;
    let source = stage::stage(artifact, &sandbox.path().join("src")).await?;
    let env = SandboxEnv::for_formula(sandbox_opts, formula, prefix, &sandbox);

    let values = PlaceholderValues {
      prefix: Some(prefix.display().to_string()),
      artifact: Some(artifact.display().to_string()),
      source: Some(source.display().to_string()),
      work: Some(sandbox.path().display().to_string()),
      home: env.get("HOME").map(str::to_string),
    };

    let mut steps = Vec::with_capacity(formula.install.len());
    for (index, invocation) in formula.install.iter().enumerate() {
      let rendered = invocation
        .render(&values)
        .map_err(|source| InstallError::Placeholder { index, source })?;
      let step = rendered.to_string();
      debug!(formula = %formula.name, index, step = %step, "running install step");

      let output = match run_invocation(&rendered, &source, &env, sandbox_opts.step_timeout).await {
        Ok(output) => output,
        Err(StepError::TimedOut { timeout, .. }) => {
          return Err(InstallError::TimedOut { index, step, timeout });
        }
        Err(e) => return Err(InstallError::Step { index, step, source: e }),
      };

      if !output.success() {
        return Err(InstallError::StepFailed {
          index,
          step,
          code: output.code,
          stderr: tail(output.stderr.trim_end(), STDERR_TAIL_BYTES).to_string(),
        });
      }

      steps.push(StepRecord {
        step,
        code: output.code,
        duration: output.duration,
      });
    }

    info!(formula = %formula.name, steps = steps.len(), "install steps completed");
    Ok(InstallReport {
      formula: formula.name.clone(),
      version: formula.version.clone(),
      prefix: prefix.to_path_buf(),
      steps,
    })
  }
}

fn is_plain_segment(segment: &str) -> bool {
  if segment.contains(['\\', '\0']) {
    return false;
  }
  let mut components = Path::new(segment).components();
  matches!(components.next(), Some(Component::Normal(s)) if s == segment) && components.next().is_none()
}

/// Remove an install prefix and its now empty parent directory.
pub async fn remove_prefix(prefix: &Path) {
  match tokio::fs::remove_dir_all(prefix).await {
    Ok(()) => debug!(prefix = %prefix.display(), "removed prefix"),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => warn!(prefix = %prefix.display(), error = %e, "failed to remove prefix"),
  }
  if let Some(parent) = prefix.parent() {
    // Only succeeds when no other version is left
    let _ = tokio::fs::remove_dir(parent).await;
  }
}

mod duration_ms {
  use std::time::Duration;

  use serde::Serializer;

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
  }
}
