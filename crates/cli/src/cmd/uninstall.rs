//! Implementation of the `keg uninstall` command.

use std::process::ExitCode;

use anyhow::Result;

use super::{GlobalOptions, build_engine, report_error, runtime};
use crate::output::{print_json, print_success};

/// Remove an installed formula's prefix and its installed-state record.
///
/// Refuses while another installed formula depends on it, unless `force`.
pub fn cmd_uninstall(global: &GlobalOptions, name: &str, force: bool) -> Result<ExitCode> {
  let engine = build_engine(global.engine_config()?)?;
  let rt = runtime()?;

  let record = match rt.block_on(engine.uninstall(name, force)) {
    Ok(record) => record,
    Err(e) => return report_error(global.output, &e),
  };

  if global.output.is_json() {
    print_json(&serde_json::json!({
      "name": name,
      "version": record.version,
      "prefix": record.prefix,
    }))?;
  } else {
    print_success(&format!("Uninstalled {} {}", name, record.version));
  }

  Ok(ExitCode::SUCCESS)
}
