//! Engine result and error types.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::acceptance::TestReport;
use crate::execute::{InstallError, InstallReport};
use crate::fetch::FetchError;
use crate::index::IndexError;
use crate::resolve::{InstallPlan, ResolveError};
use crate::state::StateError;

/// Lifecycle stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Resolve,
  Fetch,
  Verify,
  Install,
  Test,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stage::Resolve => "resolve",
      Stage::Fetch => "fetch",
      Stage::Verify => "verify",
      Stage::Install => "install",
      Stage::Test => "test",
    };
    f.write_str(s)
  }
}

/// Run state machine.
///
/// `Resolving -> Fetching(i) -> Installing(i) -> Testing(i) -> Done`, where
/// `i` is the position of the entry in the plan. Any fatal error moves the
/// run to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RunState {
  Resolving,
  Fetching(usize),
  Installing(usize),
  Testing(usize),
  Done,
  Failed(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Install(#[from] InstallError),

  #[error("acceptance test failed for `{formula}`: {reason}")]
  TestFailed { formula: String, reason: String },

  #[error("run cancelled")]
  Cancelled,

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Index(#[from] IndexError),

  #[error("`{0}` is not installed")]
  NotInstalled(String),

  #[error("`{name}` is required by {}", dependents.join(", "))]
  RequiredBy { name: String, dependents: Vec<String> },

  #[error("task failed: {0}")]
  Task(String),
}

/// Error taxonomy shared by reports and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
  MalformedFormula,
  UnknownDependency,
  CyclicDependency,
  FetchError,
  IntegrityMismatch,
  InstallStepFailed,
  TimedOut,
  TestFailed,
  Cancelled,
  StateError,
}

impl ErrorKind {
  fn as_str(self) -> &'static str {
    match self {
      ErrorKind::MalformedFormula => "MalformedFormula",
      ErrorKind::UnknownDependency => "UnknownDependency",
      ErrorKind::CyclicDependency => "CyclicDependency",
      ErrorKind::FetchError => "FetchError",
      ErrorKind::IntegrityMismatch => "IntegrityMismatch",
      ErrorKind::InstallStepFailed => "InstallStepFailed",
      ErrorKind::TimedOut => "TimedOut",
      ErrorKind::TestFailed => "TestFailed",
      ErrorKind::Cancelled => "Cancelled",
      ErrorKind::StateError => "StateError",
    }
  }

  fn code(self) -> i32 {
    match self {
      ErrorKind::MalformedFormula => 10,
      ErrorKind::UnknownDependency => 11,
      ErrorKind::CyclicDependency => 12,
      ErrorKind::FetchError => 20,
      ErrorKind::IntegrityMismatch => 21,
      ErrorKind::InstallStepFailed => 30,
      ErrorKind::TimedOut => 31,
      ErrorKind::TestFailed => 40,
      ErrorKind::Cancelled => 50,
      ErrorKind::StateError => 60,
    }
  }
}

impl EngineError {
  fn error_kind(&self) -> ErrorKind {
    match self {
      EngineError::Resolve(ResolveError::UnknownDependency { .. }) => ErrorKind::UnknownDependency,
      EngineError::Resolve(ResolveError::CyclicDependency { .. }) => ErrorKind::CyclicDependency,
      EngineError::Resolve(ResolveError::State(_)) => ErrorKind::StateError,
      EngineError::Resolve(_) | EngineError::Index(_) => ErrorKind::MalformedFormula,
      EngineError::Fetch(FetchError::IntegrityMismatch { .. }) => ErrorKind::IntegrityMismatch,
      EngineError::Fetch(_) => ErrorKind::FetchError,
      EngineError::Install(InstallError::TimedOut { .. }) => ErrorKind::TimedOut,
      EngineError::Install(_) | EngineError::Task(_) => ErrorKind::InstallStepFailed,
      EngineError::TestFailed { .. } => ErrorKind::TestFailed,
      EngineError::Cancelled => ErrorKind::Cancelled,
      EngineError::State(_) | EngineError::NotInstalled(_) | EngineError::RequiredBy { .. } => ErrorKind::StateError,
    }
  }

  /// Short name of the error kind.
  pub fn kind(&self) -> &'static str {
    self.error_kind().as_str()
  }

  /// Process exit code for this error.
  pub fn exit_code(&self) -> i32 {
    self.error_kind().code()
  }

  /// Stage an error of this kind belongs to when raised by its component.
  pub fn stage(&self) -> Stage {
    match self {
      EngineError::Resolve(_) | EngineError::Index(_) => Stage::Resolve,
      EngineError::Fetch(FetchError::IntegrityMismatch { .. }) => Stage::Verify,
      EngineError::Fetch(_) => Stage::Fetch,
      EngineError::TestFailed { .. } => Stage::Test,
      _ => Stage::Install,
    }
  }
}

/// The fatal error that ended a run.
#[derive(Debug)]
pub struct Failure {
  pub formula: String,
  pub stage: Stage,
  pub error: EngineError,
}

impl Failure {
  pub fn new(formula: impl Into<String>, error: EngineError) -> Self {
    Self {
      formula: formula.into(),
      stage: error.stage(),
      error,
    }
  }

  pub fn at(formula: impl Into<String>, stage: Stage, error: EngineError) -> Self {
    Self {
      formula: formula.into(),
      stage,
      error,
    }
  }
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} failed at {}: {}", self.formula, self.stage, self.error)
  }
}

impl Serialize for Failure {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut s = serializer.serialize_struct("Failure", 5)?;
    s.serialize_field("formula", &self.formula)?;
    s.serialize_field("stage", &self.stage)?;
    s.serialize_field("kind", self.error.kind())?;
    s.serialize_field("message", &self.error.to_string())?;
    s.serialize_field("exit_code", &self.error.exit_code())?;
    s.end()
  }
}

/// Everything a run did, for reporting.
#[derive(Debug, Serialize)]
pub struct RunReport {
  pub target: String,
  pub dry_run: bool,
  /// The resolved plan. `None` when resolution failed.
  pub plan: Option<InstallPlan>,
  /// Formulas installed by this run, in plan order.
  pub installed: Vec<String>,
  /// Formulas that were already satisfied.
  pub skipped: Vec<String>,
  /// Step records of every installed formula, in plan order.
  pub installs: Vec<InstallReport>,
  pub tests: Vec<TestReport>,
  pub state: RunState,
  pub failure: Option<Failure>,
  /// Every state transition in the order it happened.
  pub history: Vec<RunState>,
}

impl RunReport {
  pub(crate) fn new(target: &str, dry_run: bool) -> Self {
    Self {
      target: target.to_string(),
      dry_run,
      plan: None,
      installed: Vec::new(),
      skipped: Vec::new(),
      installs: Vec::new(),
      tests: Vec::new(),
      state: RunState::Resolving,
      failure: None,
      history: Vec::new(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.state == RunState::Done
  }

  /// The run failed but some formulas were installed and stay installed.
  pub fn is_partial_success(&self) -> bool {
    self.failure.is_some() && !self.installed.is_empty()
  }

  pub fn exit_code(&self) -> i32 {
    self.failure.as_ref().map(|f| f.error.exit_code()).unwrap_or(0)
  }

  pub fn tested(&self) -> Vec<&str> {
    self.tests.iter().map(|t| t.formula.as_str()).collect()
  }
}
