//! Implementation of the `keg install` command.
//!
//! Resolves the formula's dependency graph, then fetches, verifies, installs
//! and tests everything that is not installed yet.

use std::process::ExitCode;

use anyhow::Result;
use tracing::warn;

use keg_lib::engine::{RunReport, TestScope};

use super::plan::print_plan;
use super::{GlobalOptions, build_engine, exit_code, runtime};
use crate::output::{
  format_duration, print_detail, print_error, print_info, print_json, print_success, print_warning,
};

/// Execute the install command.
///
/// Ctrl-C stops the engine from starting new work. Formulas already being
/// installed are allowed to finish, and the run ends as cancelled.
pub fn cmd_install(
  global: &GlobalOptions,
  formula: &str,
  dry_run: bool,
  skip_test: bool,
  test_all: bool,
) -> Result<ExitCode> {
  let mut config = global.engine_config()?;
  config.dry_run = dry_run;
  config.test_scope = if skip_test {
    TestScope::None
  } else if test_all {
    TestScope::All
  } else {
    TestScope::Target
  };

  let engine = build_engine(config)?;
  let rt = runtime()?;
  let report = rt.block_on(async {
    let cancel = engine.cancel_signal();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, waiting for running installs to finish");
        cancel.cancel();
      }
    });
    engine.install(formula).await
  });

  if global.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, global.verbose);
  }

  Ok(exit_code(report.exit_code()))
}

fn print_report(report: &RunReport, verbose: bool) {
  if report.dry_run {
    if let Some(plan) = &report.plan {
      print_plan(plan);
      println!();
      print_info(&format!(
        "Dry run: {} formula(s) would be installed",
        plan.pending().count()
      ));
    }
    return;
  }

  if !report.skipped.is_empty() {
    print_info(&format!("Already installed: {}", report.skipped.join(", ")));
  }

  for install in &report.installs {
    print_success(&format!("Installed {} {}", install.formula, install.version));
    if verbose {
      for step in &install.steps {
        print_detail(&step.step, &format_duration(step.duration));
      }
    }
  }

  for test in &report.tests {
    if test.passed {
      print_success(&format!("Test passed: {}", test.formula));
    } else {
      print_error(&format!(
        "Test failed: {}: {}",
        test.formula,
        test.reason.as_deref().unwrap_or("unknown reason")
      ));
      if verbose && !test.output.is_empty() {
        println!("{}", test.output);
      }
    }
  }

  match &report.failure {
    None if report.installs.is_empty() => print_info(&format!("{} is already installed", report.target)),
    None => print_success(&format!("Done: {}", report.target)),
    Some(failure) => {
      print_error(&failure.to_string());
      if report.is_partial_success() {
        print_warning(&format!(
          "Partial success: {} stay installed",
          report.installed.join(", ")
        ));
      }
    }
  }
}
