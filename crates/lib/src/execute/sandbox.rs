//! Per-formula sandboxes.
//!
//! Every install and every acceptance test runs in its own scratch directory
//! with a cleared environment. Only allow-listed variables are passed through
//! from the engine's own environment; everything else is set explicitly.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

use crate::consts::{DEFAULT_ENV_PASSTHROUGH, DEFAULT_STEP_TIMEOUT, SOURCE_DATE_EPOCH};
use crate::formula::Formula;
use crate::platform::paths::data_dir;

/// Settings shared by every sandboxed invocation.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
  /// Parent directory of all sandbox directories.
  pub work_root: PathBuf,
  /// Upper bound for one invocation.
  pub step_timeout: Duration,
  /// Variables copied from the engine's environment.
  pub env_passthrough: Vec<String>,
}

impl Default for SandboxOptions {
  fn default() -> Self {
    Self {
      work_root: data_dir().join("work"),
      step_timeout: DEFAULT_STEP_TIMEOUT,
      env_passthrough: DEFAULT_ENV_PASSTHROUGH.iter().map(|s| s.to_string()).collect(),
    }
  }
}

/// A scratch directory removed on drop.
#[derive(Debug)]
pub struct Sandbox {
  dir: TempDir,
}

impl Sandbox {
  pub fn create(options: &SandboxOptions, formula: &str) -> io::Result<Self> {
    std::fs::create_dir_all(&options.work_root)?;
    let dir = tempfile::Builder::new()
      .prefix(&format!("{}-", formula))
      .tempdir_in(&options.work_root)?;
    std::fs::create_dir_all(dir.path().join("tmp"))?;
    debug!(formula = %formula, path = %dir.path().display(), "created sandbox");
    Ok(Self { dir })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.dir.path().join("tmp")
  }
}

/// The complete environment of a sandboxed process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxEnv {
  vars: BTreeMap<String, String>,
}

impl SandboxEnv {
  /// Copy the allow-listed variables that are set in the engine's environment.
  pub fn capture(allow: &[String]) -> Self {
    let vars = allow
      .iter()
      .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
      .collect();
    Self { vars }
  }

  /// Environment for work on `formula` installed into `prefix`.
  ///
  /// HOME falls back to the sandbox directory when it is not passed through.
  pub fn for_formula(options: &SandboxOptions, formula: &Formula, prefix: &Path, sandbox: &Sandbox) -> Self {
    let mut env = Self::capture(&options.env_passthrough);
    if !env.vars.contains_key("HOME") {
      env.set("HOME", sandbox.path().display().to_string());
    }
    env
      .set("KEG_PREFIX", prefix.display().to_string())
      .set("KEG_FORMULA", formula.name.clone())
      .set("KEG_VERSION", formula.version.clone())
      .set("TMPDIR", sandbox.tmp_dir().display().to_string())
      .set("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
      .set("LC_ALL", "C");
    env
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.vars.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}
