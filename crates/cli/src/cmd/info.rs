use std::process::ExitCode;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::Result;

use keg_lib::engine::EngineError;
use keg_lib::index::{FormulaIndex, IndexError};
use keg_lib::resolve::ResolveError;

use super::{GlobalOptions, build_engine, report_error, runtime};
use crate::output::{print_json, print_stat, short_digest};

pub fn cmd_info(global: &GlobalOptions, name: &str) -> Result<ExitCode> {
  let engine = build_engine(global.engine_config()?)?;

  let formula = match engine.index().resolve(name) {
    Ok(formula) => formula,
    Err(IndexError::NotFound(name)) => {
      let err = EngineError::from(ResolveError::UnknownDependency { name, required_by: None });
      return report_error(global.output, &err);
    }
    Err(e) => return report_error(global.output, &EngineError::from(e)),
  };

  let rt = runtime()?;
  let installed = match rt.block_on(engine.state().get(name)) {
    Ok(installed) => installed,
    Err(e) => return report_error(global.output, &EngineError::from(e)),
  };

  if global.output.is_json() {
    print_json(&serde_json::json!({ "formula": formula, "installed": installed }))?;
    return Ok(ExitCode::SUCCESS);
  }

  println!("{}: {}", formula.name, formula.desc);
  print_stat("Version", &formula.version);
  if let Some(homepage) = &formula.homepage {
    print_stat("Homepage", homepage);
  }
  print_stat("URL", &formula.url);
  print_stat("Digest", &short_digest(&formula.digest));
  print_stat("License", &formula.license);
  if formula.dependencies.is_empty() {
    print_stat("Dependencies", "none");
  } else {
    print_stat("Dependencies", &formula.dependencies.join(", "));
  }

  match installed {
    Some(record) => {
      let at = UNIX_EPOCH + Duration::from_secs(record.installed_at);
      print_stat(
        "Installed",
        &format!(
          "{} in {} ({})",
          record.version,
          record.prefix.display(),
          humantime::format_rfc3339_seconds(at)
        ),
      );
    }
    None => print_stat("Installed", "no"),
  }

  Ok(ExitCode::SUCCESS)
}
