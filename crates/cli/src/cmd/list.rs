use std::process::ExitCode;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use keg_lib::engine::EngineError;

use super::{GlobalOptions, open_state, report_error, runtime};
use crate::output::{print_info, print_json};

pub fn cmd_list(global: &GlobalOptions) -> Result<ExitCode> {
  let config = global.engine_config()?;
  let state = open_state(&config);
  let rt = runtime()?;

  let records = match rt.block_on(state.list()) {
    Ok(records) => records,
    Err(e) => return report_error(global.output, &EngineError::from(e)),
  };

  if global.output.is_json() {
    let items: Vec<_> = records
      .iter()
      .map(|(name, record)| serde_json::json!({ "name": name, "record": record }))
      .collect();
    print_json(&items)?;
    return Ok(ExitCode::SUCCESS);
  }

  if records.is_empty() {
    print_info("No formulas installed.");
    return Ok(ExitCode::SUCCESS);
  }

  for (name, record) in &records {
    println!(
      "{} {} {}",
      name,
      record.version,
      record.prefix.display().if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  Ok(ExitCode::SUCCESS)
}
