//! Installation plans.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::formula::Formula;

/// What the engine does with a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
  Install,
  /// Already satisfied by the Installed-State Record.
  Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
  pub formula: Formula,
  pub action: PlanAction,
}

impl PlanEntry {
  pub fn name(&self) -> &str {
    &self.formula.name
  }

  pub fn is_pending(&self) -> bool {
    self.action == PlanAction::Install
  }
}

/// An ordered installation plan.
///
/// Every entry appears after all of its dependencies and each formula appears
/// once. The target is always the last entry. Plans are only produced by the
/// [`Resolver`](super::Resolver) and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallPlan {
  target: String,
  entries: Vec<PlanEntry>,
}

impl InstallPlan {
  pub(crate) fn new(target: String, entries: Vec<PlanEntry>) -> Self {
    Self { target, entries }
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn entries(&self) -> &[PlanEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, name: &str) -> Option<&PlanEntry> {
    self.entries.iter().find(|e| e.name() == name)
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.entries.iter().position(|e| e.name() == name)
  }

  /// Entries that will be installed, in plan order.
  pub fn pending(&self) -> impl Iterator<Item = &PlanEntry> {
    self.entries.iter().filter(|e| e.is_pending())
  }

  /// Entries already satisfied, in plan order.
  pub fn skipped(&self) -> impl Iterator<Item = &PlanEntry> {
    self.entries.iter().filter(|e| !e.is_pending())
  }

  pub fn names(&self) -> Vec<&str> {
    self.entries.iter().map(PlanEntry::name).collect()
  }

  /// Whether nothing needs installing.
  pub fn is_satisfied(&self) -> bool {
    self.pending().next().is_none()
  }

  /// Group pending entries into parallel execution waves.
  ///
  /// Every entry in a wave depends only on entries of earlier waves, also
  /// through skipped entries in between. Within a wave entries keep plan order.
  pub fn waves(&self) -> Vec<Vec<&PlanEntry>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = self
      .entries
      .iter()
      .enumerate()
      .map(|(i, entry)| (entry.name(), graph.add_node(i)))
      .collect();

    for entry in &self.entries {
      let dependent = nodes[entry.name()];
      for dep in &entry.formula.dependencies {
        if let Some(&dep_idx) = nodes.get(dep.as_str()) {
          graph.add_edge(dep_idx, dependent, ());
        }
      }
    }

    // Node indices follow plan order, which is topological, so every
    // dependency's level is known before its dependents are visited.
    let mut level = vec![0usize; self.entries.len()];
    for idx in graph.node_indices() {
      level[idx.index()] = graph
        .neighbors_directed(idx, Direction::Incoming)
        .map(|dep| level[dep.index()] + 1)
        .max()
        .unwrap_or(0);
    }

    let max_level = level.iter().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<&PlanEntry>> = vec![Vec::new(); max_level + 1];
    for (i, entry) in self.entries.iter().enumerate() {
      if entry.is_pending() {
        waves[level[i]].push(entry);
      }
    }

    // Levels holding only skipped entries leave empty waves behind
    waves.retain(|w| !w.is_empty());
    waves
  }
}
