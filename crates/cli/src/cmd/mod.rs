mod info;
mod install;
mod list;
mod plan;
mod uninstall;

pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use plan::cmd_plan;
pub use uninstall::cmd_uninstall;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use keg_lib::engine::{Engine, EngineConfig, EngineError};
use keg_lib::fetch::DefaultTransport;
use keg_lib::index::DirIndex;
use keg_lib::state::{FileStateStore, StateHandle};

use crate::output::{OutputFormat, print_error, print_json};

/// Options shared by every command.
pub struct GlobalOptions {
  pub formula_dirs: Vec<PathBuf>,
  pub root: Option<PathBuf>,
  pub output: OutputFormat,
  pub verbose: bool,
}

impl GlobalOptions {
  /// Engine settings from `KEG_*` variables, with command-line flags on top.
  pub fn engine_config(&self) -> Result<EngineConfig> {
    let mut config = EngineConfig::from_env().context("Invalid configuration")?;

    if let Some(root) = &self.root {
      // Keep the formula path following the root unless it was set explicitly
      if config.formula_path == [config.root.join("formula")] {
        config.formula_path = vec![root.join("formula")];
      }
      config.root = root.clone();
    }
    if !self.formula_dirs.is_empty() {
      config.formula_path = self.formula_dirs.clone();
    }

    Ok(config)
  }
}

pub fn open_state(config: &EngineConfig) -> StateHandle {
  StateHandle::new(FileStateStore::new(config.state_dir()))
}

pub fn build_engine(config: EngineConfig) -> Result<Engine> {
  let index = DirIndex::new(config.formula_path.clone());
  let transport = DefaultTransport::new().context("Failed to create HTTP client")?;
  let state = open_state(&config);
  Ok(Engine::new(Arc::new(index), Arc::new(transport), state, config))
}

pub fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}

pub fn exit_code(code: i32) -> ExitCode {
  ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Print an engine error in the selected format and map it to its exit code.
pub fn report_error(output: OutputFormat, error: &EngineError) -> Result<ExitCode> {
  if output.is_json() {
    print_json(&serde_json::json!({
      "kind": error.kind(),
      "message": error.to_string(),
      "exit_code": error.exit_code(),
    }))?;
  } else {
    print_error(&error.to_string());
  }
  Ok(exit_code(error.exit_code()))
}
