//! Acceptance testing of installed formulas.
//!
//! The test invocation runs in a fresh sandbox against the installed prefix.
//! A failing test is reported, never rolled back: the install itself stays.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::execute::{Sandbox, SandboxEnv, SandboxOptions, run_invocation, tail};
use crate::formula::Formula;
use crate::formula::placeholder::PlaceholderValues;

const OUTPUT_TAIL_BYTES: usize = 2048;

/// Outcome of one acceptance test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
  pub formula: String,
  pub passed: bool,
  /// Why the test failed. `None` when it passed.
  pub reason: Option<String>,
  /// Tail of the test's stdout.
  pub output: String,
}

impl TestReport {
  fn failed(formula: &Formula, reason: String, output: String) -> Self {
    Self {
      formula: formula.name.clone(),
      passed: false,
      reason: Some(reason),
      output,
    }
  }
}

pub struct AcceptanceTester {
  options: SandboxOptions,
}

impl AcceptanceTester {
  pub fn new(options: SandboxOptions) -> Self {
    Self { options }
  }

  /// Run the acceptance test of `formula` installed at `prefix`.
  pub async fn run(&self, formula: &Formula, prefix: &Path) -> TestReport {
    let sandbox = match Sandbox::create(&self.options, &format!("{}-test", formula.name)) {
      Ok(sandbox) => sandbox,
      Err(e) => return TestReport::failed(formula, format!("failed to create sandbox: {}", e), String::new()),
    };
    let env = SandboxEnv::for_formula(&self.options, formula, prefix, &sandbox);

    let values = PlaceholderValues {
      prefix: Some(prefix.display().to_string()),
      work: Some(sandbox.path().display().to_string()),
      home: env.get("HOME").map(str::to_string),
      ..Default::default()
    };
    let invocation = match formula.test.invocation.render(&values) {
      Ok(invocation) => invocation,
      Err(e) => return TestReport::failed(formula, e.to_string(), String::new()),
    };

    info!(formula = %formula.name, test = %invocation, "running acceptance test");
    let output = match run_invocation(&invocation, sandbox.path(), &env, self.options.step_timeout).await {
      Ok(output) => output,
      // Timeouts and spawn failures count as a failed test, not a failed install
      Err(e) => {
        warn!(formula = %formula.name, error = %e, "acceptance test could not complete");
        return TestReport::failed(formula, e.to_string(), String::new());
      }
    };

    let stdout = tail(output.stdout.trim_end(), OUTPUT_TAIL_BYTES).to_string();
    let expect = &formula.test.expect;

    if output.code != Some(expect.exit_code) {
      let got = output.code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
      let reason = format!("`{}` exited with {}, expected {}", invocation, got, expect.exit_code);
      warn!(formula = %formula.name, reason = %reason, "acceptance test failed");
      return TestReport::failed(formula, reason, stdout);
    }

    if let Some(needle) = &expect.stdout_contains
      && !output.stdout.contains(needle.as_str())
    {
      let reason = format!("`{}` output does not contain {:?}", invocation, needle);
      warn!(formula = %formula.name, reason = %reason, "acceptance test failed");
      return TestReport::failed(formula, reason, stdout);
    }

    info!(formula = %formula.name, "acceptance test passed");
    TestReport {
      formula: formula.name.clone(),
      passed: true,
      reason: None,
      output: stdout,
    }
  }
}
