//! Implementation of the `keg plan` command.
//!
//! Resolves a formula against the installed state and prints the resulting
//! installation plan without side effects.

use std::process::ExitCode;

use anyhow::Result;

use keg_lib::engine::EngineError;
use keg_lib::resolve::InstallPlan;

use super::{GlobalOptions, build_engine, report_error, runtime};
use crate::output::{print_info, print_json, print_plan_entry};

pub fn cmd_plan(global: &GlobalOptions, formula: &str) -> Result<ExitCode> {
  let engine = build_engine(global.engine_config()?)?;
  let rt = runtime()?;

  let plan = match rt.block_on(engine.plan(formula)) {
    Ok(plan) => plan,
    Err(e) => return report_error(global.output, &EngineError::from(e)),
  };

  if global.output.is_json() {
    print_json(&plan)?;
  } else {
    print_plan(&plan);
    println!();
    let pending = plan.pending().count();
    if pending == 0 {
      print_info(&format!("{} is already installed", plan.target()));
    } else {
      print_info(&format!("{} formula(s) to install in {} wave(s)", pending, plan.waves().len()));
    }
  }

  Ok(ExitCode::SUCCESS)
}

/// One line per entry, in plan order.
pub fn print_plan(plan: &InstallPlan) {
  println!("Plan for {}:", plan.target());
  for entry in plan.entries() {
    print_plan_entry(entry.is_pending(), entry.name(), &entry.formula.version);
  }
}
