//! Engine orchestration.
//!
//! The engine drives one install request through its lifecycle:
//! 1. Resolve the target into an installation plan
//! 2. Split pending entries into waves of independent formulas
//! 3. Per entry: fetch and verify, install, record, optionally test
//! 4. Stop starting new work after the first fatal error or cancellation
//!
//! A failed acceptance test is not fatal: the formula stays installed, its
//! dependents still install, and the first test failure is reported once
//! all waves are done.
//!
//! Entries of a wave run concurrently, bounded by `parallelism`. A wave only
//! starts after the previous one finished completely, so no formula is
//! installed before all of its dependencies are.

pub mod cancel;
pub mod config;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::acceptance::{AcceptanceTester, TestReport};
use crate::execute::{InstallReport, Installer, remove_prefix};
use crate::fetch::{Fetcher, Transport};
use crate::formula::Formula;
use crate::index::FormulaIndex;
use crate::resolve::{InstallPlan, PlanEntry, ResolveError, Resolver};
use crate::state::{InstalledState, StateHandle};

pub use cancel::CancelSignal;
pub use config::{ConfigError, EngineConfig, TestScope};
pub use types::{EngineError, Failure, RunReport, RunState, Stage};

/// Shared by all entry tasks of a run.
struct EntryContext {
  fetcher: Fetcher,
  installer: Installer,
  tester: AcceptanceTester,
  state: StateHandle,
  history: mpsc::UnboundedSender<RunState>,
}

/// Result of one successfully installed entry.
struct EntryOutcome {
  position: usize,
  install: InstallReport,
  test: Option<TestReport>,
}

pub struct Engine {
  index: Arc<dyn FormulaIndex>,
  transport: Arc<dyn Transport>,
  state: StateHandle,
  config: EngineConfig,
  cancel: CancelSignal,
}

impl Engine {
  pub fn new(
    index: Arc<dyn FormulaIndex>,
    transport: Arc<dyn Transport>,
    state: StateHandle,
    config: EngineConfig,
  ) -> Self {
    Self {
      index,
      transport,
      state,
      config,
      cancel: CancelSignal::new(),
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn index(&self) -> &dyn FormulaIndex {
    self.index.as_ref()
  }

  pub fn state(&self) -> &StateHandle {
    &self.state
  }

  /// A handle that stops the engine from starting new work when raised.
  pub fn cancel_signal(&self) -> CancelSignal {
    self.cancel.clone()
  }

  /// Resolve `target` against the current installed state.
  pub async fn plan(&self, target: &str) -> Result<InstallPlan, ResolveError> {
    let state = self.state.read().await;
    Resolver::new(self.index.as_ref(), &**state).resolve(target)
  }

  /// Install `target` and everything it depends on.
  pub async fn install(&self, target: &str) -> RunReport {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut report = RunReport::new(target, self.config.dry_run);

    let _ = tx.send(RunState::Resolving);
    let failure = self.run(target, &mut report, tx).await;

    while let Ok(state) = rx.try_recv() {
      report.history.push(state);
    }

    report.state = match &failure {
      Some(failure) => RunState::Failed(failure.to_string()),
      None => RunState::Done,
    };
    report.history.push(report.state.clone());
    report.failure = failure;

    match &report.failure {
      None => info!(target = %target, installed = report.installed.len(), "run complete"),
      Some(failure) => error!(
        target = %target,
        formula = %failure.formula,
        stage = %failure.stage,
        error = %failure.error,
        partial = report.is_partial_success(),
        "run failed"
      ),
    }
    report
  }

  async fn run(
    &self,
    target: &str,
    report: &mut RunReport,
    history: mpsc::UnboundedSender<RunState>,
  ) -> Option<Failure> {
    if self.cancel.is_cancelled() {
      return Some(Failure::at(target, Stage::Resolve, EngineError::Cancelled));
    }

    let plan = match self.plan(target).await {
      Ok(plan) => plan,
      Err(e) => return Some(Failure::new(target, e.into())),
    };
    report.skipped = plan.skipped().map(|e| e.name().to_string()).collect();

    if self.config.dry_run {
      info!(target = %target, pending = plan.pending().count(), "dry run, nothing installed");
      report.plan = Some(plan);
      return None;
    }

    let waves: Vec<Vec<(usize, Formula)>> = plan
      .waves()
      .into_iter()
      .map(|wave| {
        wave
          .into_iter()
          .map(|entry| (plan.position(entry.name()).unwrap_or_default(), entry.formula.clone()))
          .collect()
      })
      .collect();
    info!(target = %target, wave_count = waves.len(), "computed install waves");
    let entries: Vec<PlanEntry> = plan.entries().to_vec();
    report.plan = Some(plan);

    let ctx = Arc::new(EntryContext {
      fetcher: Fetcher::new(self.transport.clone(), self.config.fetch_options()),
      installer: Installer::new(self.config.install_options()),
      tester: AcceptanceTester::new(self.config.sandbox_options()),
      state: self.state.clone(),
      history,
    });
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut test_failures = Vec::new();

    for (wave_idx, wave) in waves.into_iter().enumerate() {
      if self.cancel.is_cancelled() {
        let next = wave.first().map(|(_, f)| f.name.clone()).unwrap_or_else(|| target.to_string());
        warn!(wave = wave_idx, "cancelled, not starting wave");
        return Some(Failure::at(next, Stage::Fetch, EngineError::Cancelled));
      }
      debug!(wave = wave_idx, entries = wave.len(), "executing wave");

      let mut join_set = JoinSet::new();
      let mut names = HashMap::new();
      for (position, formula) in wave {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let cancel = self.cancel.clone();
        let test = match self.config.test_scope {
          TestScope::All => true,
          TestScope::Target => formula.name == target,
          TestScope::None => false,
        };

        let name = formula.name.clone();
        let handle = join_set.spawn(async move {
          let _permit = semaphore.acquire().await.map_err(|e| {
            Failure::at(formula.name.clone(), Stage::Fetch, EngineError::Task(e.to_string()))
          })?;
          if cancel.is_cancelled() {
            return Err(Failure::at(formula.name.clone(), Stage::Fetch, EngineError::Cancelled));
          }
          run_entry(&ctx, position, &formula, test).await
        });
        names.insert(handle.id(), name);
      }

      let mut outcomes = Vec::new();
      let mut failures = Vec::new();
      while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
          Ok((_, Ok(outcome))) => outcomes.push(outcome),
          Ok((_, Err(failure))) => failures.push(failure),
          Err(e) => failures.push(task_failure(&names, target, e)),
        }
      }

      outcomes.sort_by_key(|o| o.position);
      for outcome in outcomes {
        let name = entries[outcome.position].name().to_string();
        report.installed.push(name.clone());
        if let Some(test) = outcome.test {
          if !test.passed {
            warn!(formula = %name, "acceptance test failed, continuing with dependents");
            test_failures.push(Failure::at(
              name.clone(),
              Stage::Test,
              EngineError::TestFailed {
                formula: name.clone(),
                reason: test.reason.clone().unwrap_or_default(),
              },
            ));
          }
          report.tests.push(test);
        }
        debug!(formula = %name, prefix = %outcome.install.prefix.display(), "entry complete");
        report.installs.push(outcome.install);
      }

      // Report a real failure over a cancellation of a sibling
      if !failures.is_empty() {
        failures.sort_by_key(|f| matches!(f.error, EngineError::Cancelled));
        return failures.into_iter().next();
      }
    }

    test_failures.into_iter().next()
  }

  /// Remove an installed formula and its record.
  ///
  /// Refuses while other installed formulas depend on it, unless `force`.
  pub async fn uninstall(&self, name: &str, force: bool) -> Result<InstalledState, EngineError> {
    let installed = self.state.list().await?;
    if !installed.iter().any(|(n, _)| n == name) {
      return Err(EngineError::NotInstalled(name.to_string()));
    }

    if !force {
      let dependents: Vec<String> = installed
        .iter()
        .filter(|(n, _)| n != name)
        .filter(|(n, _)| self.index.resolve(n).is_ok_and(|f| f.depends_on(name)))
        .map(|(n, _)| n.clone())
        .collect();
      if !dependents.is_empty() {
        return Err(EngineError::RequiredBy {
          name: name.to_string(),
          dependents,
        });
      }
    }

    let record = self
      .state
      .remove(name)
      .await?
      .ok_or_else(|| EngineError::NotInstalled(name.to_string()))?;
    remove_prefix(&record.prefix).await;
    info!(formula = %name, version = %record.version, "uninstalled");
    Ok(record)
  }
}

/// Attribute a task that panicked or was aborted to the formula it ran.
fn task_failure(names: &HashMap<task::Id, String>, target: &str, err: JoinError) -> Failure {
  let formula = names.get(&err.id()).map(String::as_str).unwrap_or(target);
  error!(formula = %formula, error = %err, "install task panicked");
  Failure::at(formula, Stage::Install, EngineError::Task(err.to_string()))
}

/// Fetch, install, record and optionally test one plan entry.
async fn run_entry(ctx: &EntryContext, position: usize, formula: &Formula, test: bool) -> Result<EntryOutcome, Failure> {
  let name = formula.name.as_str();

  let _ = ctx.history.send(RunState::Fetching(position));
  let artifact = ctx
    .fetcher
    .fetch(formula)
    .await
    .map_err(|e| Failure::new(name, e.into()))?;

  let previous = ctx
    .state
    .get(name)
    .await
    .map_err(|e| Failure::at(name, Stage::Install, e.into()))?;

  let _ = ctx.history.send(RunState::Installing(position));
  let install = ctx
    .installer
    .install(formula, &artifact.path)
    .await
    .map_err(|e| Failure::new(name, e.into()))?;

  let record = InstalledState::for_formula(formula, install.prefix.clone());
  if let Err(e) = ctx.state.put(name, record).await {
    // An unrecorded install is not an install
    remove_prefix(&install.prefix).await;
    return Err(Failure::at(name, Stage::Install, e.into()));
  }

  // Drop the previous version once the new record is in place
  if let Some(previous) = previous {
    let cellar = &ctx.installer.options().cellar;
    if previous.prefix != install.prefix && previous.prefix.starts_with(cellar) {
      info!(formula = %name, version = %previous.version, "removing previous version");
      remove_prefix(&previous.prefix).await;
    }
  }

  let test = if test {
    let _ = ctx.history.send(RunState::Testing(position));
    Some(ctx.tester.run(formula, &install.prefix).await)
  } else {
    None
  };

  Ok(EntryOutcome {
    position,
    install,
    test,
  })
}
