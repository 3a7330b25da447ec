//! Installed-State Record.
//!
//! The record of what is installed lives outside the engine. The engine only
//! talks to it through the narrow [`StateStore`] interface (get/put/remove)
//! and shares it between concurrent installs through a [`StateHandle`]:
//! reads may overlap, writes are serialized.

pub mod file;
pub mod memory;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::formula::Formula;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// What the store remembers about one installed formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledState {
  pub version: String,
  /// Install target directory the formula was installed into.
  pub prefix: PathBuf,
  /// Digest of the artifact that was installed, as `algorithm:hex`.
  pub digest: String,
  /// Unix timestamp (seconds) of the successful install.
  pub installed_at: u64,
}

impl InstalledState {
  pub fn for_formula(formula: &Formula, prefix: PathBuf) -> Self {
    Self {
      version: formula.version.clone(),
      prefix,
      digest: formula.digest.to_string(),
      installed_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }

  /// Whether this record satisfies `formula`.
  pub fn satisfies(&self, formula: &Formula) -> bool {
    self.version == formula.version
  }
}

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read installed state for `{name}`: {source}")]
  Read {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write installed state for `{name}`: {source}")]
  Write {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove installed state for `{name}`: {source}")]
  Remove {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("corrupt installed state for `{name}`: {source}")]
  Parse {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize installed state for `{name}`: {source}")]
  Serialize {
    name: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Storage interface for the Installed-State Record.
pub trait StateStore: Send + Sync {
  fn get(&self, name: &str) -> Result<Option<InstalledState>, StateError>;

  fn put(&mut self, name: &str, state: InstalledState) -> Result<(), StateError>;

  /// Remove the record for `name`, returning it if it existed.
  fn remove(&mut self, name: &str) -> Result<Option<InstalledState>, StateError>;

  /// All records, sorted by name.
  fn list(&self) -> Result<Vec<(String, InstalledState)>, StateError>;
}

/// Shared, lock-protected access to a [`StateStore`].
#[derive(Clone)]
pub struct StateHandle {
  inner: Arc<RwLock<Box<dyn StateStore>>>,
}

impl StateHandle {
  pub fn new(store: impl StateStore + 'static) -> Self {
    Self {
      inner: Arc::new(RwLock::new(Box::new(store))),
    }
  }

  /// Hold a read lock for a batch of lookups.
  pub async fn read(&self) -> RwLockReadGuard<'_, Box<dyn StateStore>> {
    self.inner.read().await
  }

  pub async fn get(&self, name: &str) -> Result<Option<InstalledState>, StateError> {
    self.inner.read().await.get(name)
  }

  pub async fn put(&self, name: &str, state: InstalledState) -> Result<(), StateError> {
    self.inner.write().await.put(name, state)
  }

  pub async fn remove(&self, name: &str) -> Result<Option<InstalledState>, StateError> {
    self.inner.write().await.remove(name)
  }

  pub async fn list(&self) -> Result<Vec<(String, InstalledState)>, StateError> {
    self.inner.read().await.list()
  }
}

impl std::fmt::Debug for StateHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StateHandle").finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::formula;

  #[test]
  fn satisfies_compares_version() {
    let f = formula("bat", &[]);
    let state = InstalledState::for_formula(&f, PathBuf::from("/cellar/bat/1.0.0"));
    assert!(state.satisfies(&f));

    let mut newer = f.clone();
    newer.version = "2.0.0".to_string();
    assert!(!state.satisfies(&newer));
  }

  #[tokio::test]
  async fn handle_serializes_writes() {
    let handle = StateHandle::new(MemoryStateStore::new());
    let f = formula("bat", &[]);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
      let handle = handle.clone();
      let state = InstalledState::for_formula(&f, PathBuf::from(format!("/cellar/{}", i)));
      tasks.spawn(async move { handle.put(&format!("f{}", i), state).await });
    }
    while let Some(res) = tasks.join_next().await {
      res.unwrap().unwrap();
    }

    assert_eq!(handle.list().await.unwrap().len(), 8);
    assert!(handle.remove("f3").await.unwrap().is_some());
    assert!(handle.get("f3").await.unwrap().is_none());
  }
}
