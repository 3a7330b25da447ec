//! Engine configuration.
//!
//! Every setting has a default and can be overridden through a `KEG_*`
//! environment variable. Command-line flags are applied on top by the CLI.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::consts::{
  DEFAULT_ENV_PASSTHROUGH, DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, DEFAULT_STEP_TIMEOUT, RETRY_DELAY_MS,
};
use crate::execute::{InstallOptions, SandboxOptions};
use crate::fetch::FetchOptions;
use crate::platform::paths::data_dir;

pub const ENV_ROOT: &str = "KEG_ROOT";
pub const ENV_FORMULA_PATH: &str = "KEG_FORMULA_PATH";
pub const ENV_PARALLELISM: &str = "KEG_PARALLELISM";
pub const ENV_FETCH_TIMEOUT: &str = "KEG_FETCH_TIMEOUT";
pub const ENV_STEP_TIMEOUT: &str = "KEG_STEP_TIMEOUT";
pub const ENV_FETCH_RETRIES: &str = "KEG_FETCH_RETRIES";
pub const ENV_PASSTHROUGH: &str = "KEG_ENV_PASSTHROUGH";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value for {var}: `{value}` ({reason})")]
  Invalid {
    var: &'static str,
    value: String,
    reason: String,
  },
}

/// Which freshly installed formulas get their acceptance test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestScope {
  /// Only the requested formula.
  #[default]
  Target,
  /// Every formula installed by the run.
  All,
  None,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Root for the cellar, download cache, installed state and sandboxes.
  pub root: PathBuf,
  /// Formula directories, searched in order.
  pub formula_path: Vec<PathBuf>,
  /// Maximum number of formulas installed concurrently.
  pub parallelism: usize,
  pub fetch_timeout: Duration,
  pub fetch_retries: u32,
  pub retry_delay: Duration,
  pub step_timeout: Duration,
  /// Variables passed from the engine's environment into sandboxes.
  pub env_passthrough: Vec<String>,
  pub test_scope: TestScope,
  /// Resolve only; never fetch, install or touch state.
  pub dry_run: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self::with_root(data_dir())
  }
}

impl EngineConfig {
  /// Default settings with everything stored below `root`.
  pub fn with_root(root: PathBuf) -> Self {
    Self {
      formula_path: vec![root.join("formula")],
      root,
      parallelism: num_cpus(),
      fetch_timeout: DEFAULT_FETCH_TIMEOUT,
      fetch_retries: DEFAULT_FETCH_RETRIES,
      retry_delay: Duration::from_millis(RETRY_DELAY_MS),
      step_timeout: DEFAULT_STEP_TIMEOUT,
      env_passthrough: DEFAULT_ENV_PASSTHROUGH.iter().map(|s| s.to_string()).collect(),
      test_scope: TestScope::default(),
      dry_run: false,
    }
  }

  /// Defaults overridden by `KEG_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = match env_var(ENV_ROOT) {
      Some(root) => Self::with_root(PathBuf::from(root)),
      None => Self::default(),
    };

    if let Some(path) = env_var(ENV_FORMULA_PATH) {
      config.formula_path = std::env::split_paths(&path).filter(|p| !p.as_os_str().is_empty()).collect();
    }
    if let Some(value) = env_var(ENV_PARALLELISM) {
      config.parallelism = match value.parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return Err(invalid(ENV_PARALLELISM, &value, "expected a positive integer")),
      };
    }
    if let Some(value) = env_var(ENV_FETCH_TIMEOUT) {
      config.fetch_timeout = parse_duration(ENV_FETCH_TIMEOUT, &value)?;
    }
    if let Some(value) = env_var(ENV_STEP_TIMEOUT) {
      config.step_timeout = parse_duration(ENV_STEP_TIMEOUT, &value)?;
    }
    if let Some(value) = env_var(ENV_FETCH_RETRIES) {
      config.fetch_retries = value
        .parse()
        .map_err(|e: std::num::ParseIntError| invalid(ENV_FETCH_RETRIES, &value, &e.to_string()))?;
    }
    if let Some(value) = env_var(ENV_PASSTHROUGH) {
      config.env_passthrough = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    }

    Ok(config)
  }

  pub fn cellar_dir(&self) -> PathBuf {
    self.root.join("cellar")
  }

  pub fn download_dir(&self) -> PathBuf {
    self.root.join("cache").join("downloads")
  }

  pub fn state_dir(&self) -> PathBuf {
    self.root.join("state")
  }

  pub fn work_dir(&self) -> PathBuf {
    self.root.join("work")
  }

  pub fn fetch_options(&self) -> FetchOptions {
    FetchOptions {
      timeout: self.fetch_timeout,
      retries: self.fetch_retries,
      retry_delay: self.retry_delay,
      download_dir: self.download_dir(),
    }
  }

  pub fn sandbox_options(&self) -> SandboxOptions {
    SandboxOptions {
      work_root: self.work_dir(),
      step_timeout: self.step_timeout,
      env_passthrough: self.env_passthrough.clone(),
    }
  }

  pub fn install_options(&self) -> InstallOptions {
    InstallOptions {
      cellar: self.cellar_dir(),
      sandbox: self.sandbox_options(),
    }
  }
}

fn env_var(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(value.trim()).map_err(|e| invalid(var, value, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
  ConfigError::Invalid {
    var,
    value: value.to_string(),
    reason: reason.to_string(),
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const ALL_VARS: [&str; 7] = [
    ENV_ROOT,
    ENV_FORMULA_PATH,
    ENV_PARALLELISM,
    ENV_FETCH_TIMEOUT,
    ENV_STEP_TIMEOUT,
    ENV_FETCH_RETRIES,
    ENV_PASSTHROUGH,
  ];

  /// Every config variable, unset unless given in `set`.
  fn vars(set: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
    ALL_VARS
      .iter()
      .map(|var| (*var, set.iter().find(|(k, _)| k == var).map(|(_, v)| *v)))
      .collect()
  }

  #[test]
  fn directories_live_under_root() {
    let config = EngineConfig::with_root(PathBuf::from("/opt/keg"));
    assert_eq!(config.cellar_dir(), PathBuf::from("/opt/keg/cellar"));
    assert_eq!(config.download_dir(), PathBuf::from("/opt/keg/cache/downloads"));
    assert_eq!(config.state_dir(), PathBuf::from("/opt/keg/state"));
    assert_eq!(config.work_dir(), PathBuf::from("/opt/keg/work"));
    assert_eq!(config.formula_path, vec![PathBuf::from("/opt/keg/formula")]);
  }

  #[test]
  #[serial]
  fn from_env_without_vars_uses_defaults() {
    temp_env::with_vars(vars(&[]), || {
      let config = EngineConfig::from_env().unwrap();
      assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
      assert_eq!(config.fetch_retries, DEFAULT_FETCH_RETRIES);
      assert_eq!(config.env_passthrough, vec!["HOME", "PATH"]);
      assert!(config.parallelism > 0);
      assert_eq!(config.test_scope, TestScope::Target);
    });
  }

  #[test]
  #[serial]
  fn from_env_reads_overrides() {
    let overrides = vars(&[
      (ENV_ROOT, "/srv/keg"),
      (ENV_FORMULA_PATH, "/a:/b"),
      (ENV_PARALLELISM, "2"),
      (ENV_FETCH_TIMEOUT, "30s"),
      (ENV_STEP_TIMEOUT, "10m"),
      (ENV_FETCH_RETRIES, "0"),
      (ENV_PASSTHROUGH, "HOME, PATH,TERM"),
    ]);
    temp_env::with_vars(overrides, || {
      let config = EngineConfig::from_env().unwrap();
      assert_eq!(config.root, PathBuf::from("/srv/keg"));
      assert_eq!(config.formula_path, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
      assert_eq!(config.parallelism, 2);
      assert_eq!(config.fetch_timeout, Duration::from_secs(30));
      assert_eq!(config.step_timeout, Duration::from_secs(600));
      assert_eq!(config.fetch_retries, 0);
      assert_eq!(config.env_passthrough, vec!["HOME", "PATH", "TERM"]);
    });
  }

  #[test]
  #[serial]
  fn from_env_rejects_bad_values() {
    temp_env::with_vars(vars(&[(ENV_PARALLELISM, "0")]), || {
      let err = EngineConfig::from_env().unwrap_err();
      assert!(err.to_string().contains(ENV_PARALLELISM));
    });

    temp_env::with_vars(vars(&[(ENV_FETCH_TIMEOUT, "soon")]), || {
      assert!(EngineConfig::from_env().is_err());
    });
  }
}
