//! Dependency resolution.
//!
//! Turns a target formula name into an [`InstallPlan`] by depth-first
//! traversal of its dependency edges. Resolution has no side effects: it only
//! reads the [`FormulaIndex`] and the Installed-State Record.

pub mod plan;

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::formula::FormulaError;
use crate::index::{FormulaIndex, IndexError};
use crate::state::{StateError, StateStore};

pub use plan::{InstallPlan, PlanAction, PlanEntry};

#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("unknown formula `{name}`{}", required_by.as_ref().map(|r| format!(" (required by `{}`)", r)).unwrap_or_default())]
  UnknownDependency { name: String, required_by: Option<String> },

  /// The cycle lists each member once, starting at the formula that was re-entered.
  #[error("dependency cycle: {}", format_cycle(cycle))]
  CyclicDependency { cycle: Vec<String> },

  #[error(transparent)]
  Malformed(#[from] FormulaError),

  #[error(transparent)]
  Index(IndexError),

  #[error(transparent)]
  State(#[from] StateError),
}

fn format_cycle(cycle: &[String]) -> String {
  let mut path = cycle.join(" -> ");
  if let Some(first) = cycle.first() {
    path.push_str(" -> ");
    path.push_str(first);
  }
  path
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  InProgress,
  Done,
}

/// Builds installation plans from an index and the installed state.
pub struct Resolver<'a> {
  index: &'a dyn FormulaIndex,
  state: &'a dyn StateStore,
}

impl<'a> Resolver<'a> {
  pub fn new(index: &'a dyn FormulaIndex, state: &'a dyn StateStore) -> Self {
    Self { index, state }
  }

  /// Resolve `target` and its transitive dependencies into a plan.
  pub fn resolve(&self, target: &str) -> Result<InstallPlan, ResolveError> {
    info!(target = %target, "resolving dependencies");

    let mut walk = Walk {
      resolver: self,
      marks: HashMap::new(),
      stack: Vec::new(),
      entries: Vec::new(),
    };
    walk.visit(target, None)?;

    let plan = InstallPlan::new(target.to_string(), walk.entries);
    info!(
      target = %target,
      total = plan.len(),
      pending = plan.pending().count(),
      "resolved plan"
    );
    Ok(plan)
  }
}

struct Walk<'r, 'a> {
  resolver: &'r Resolver<'a>,
  marks: HashMap<String, Mark>,
  /// Names currently being visited, outermost first.
  stack: Vec<String>,
  entries: Vec<PlanEntry>,
}

impl Walk<'_, '_> {
  fn visit(&mut self, name: &str, required_by: Option<&str>) -> Result<(), ResolveError> {
    match self.marks.get(name) {
      Some(Mark::Done) => return Ok(()),
      Some(Mark::InProgress) => {
        let start = self.stack.iter().position(|n| n == name).unwrap_or(0);
        return Err(ResolveError::CyclicDependency {
          cycle: self.stack[start..].to_vec(),
        });
      }
      None => {}
    }

    let formula = self.resolver.index.resolve(name).map_err(|e| match e {
      IndexError::NotFound(_) => ResolveError::UnknownDependency {
        name: name.to_string(),
        required_by: required_by.map(str::to_string),
      },
      IndexError::Formula(e) => ResolveError::Malformed(e),
      other => ResolveError::Index(other),
    })?;

    self.marks.insert(name.to_string(), Mark::InProgress);
    self.stack.push(name.to_string());

    for dep in &formula.dependencies {
      self.visit(dep, Some(name))?;
    }

    self.stack.pop();
    self.marks.insert(name.to_string(), Mark::Done);

    let action = match self.resolver.state.get(name)? {
      Some(installed) if installed.satisfies(&formula) => PlanAction::Skip,
      _ => PlanAction::Install,
    };
    debug!(formula = %name, ?action, "planned");
    self.entries.push(PlanEntry { formula, action });
    Ok(())
  }
}
