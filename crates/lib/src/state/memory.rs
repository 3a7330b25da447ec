//! In-memory Installed-State store.

use std::collections::BTreeMap;

use super::{InstalledState, StateError, StateStore};

#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
  records: BTreeMap<String, InstalledState>,
}

impl MemoryStateStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a record, e.g. a formula installed by other means.
  pub fn with(mut self, name: &str, state: InstalledState) -> Self {
    self.records.insert(name.to_string(), state);
    self
  }
}

impl StateStore for MemoryStateStore {
  fn get(&self, name: &str) -> Result<Option<InstalledState>, StateError> {
    Ok(self.records.get(name).cloned())
  }

  fn put(&mut self, name: &str, state: InstalledState) -> Result<(), StateError> {
    self.records.insert(name.to_string(), state);
    Ok(())
  }

  fn remove(&mut self, name: &str) -> Result<Option<InstalledState>, StateError> {
    Ok(self.records.remove(name))
  }

  fn list(&self) -> Result<Vec<(String, InstalledState)>, StateError> {
    Ok(self.records.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
  }
}
