//! Installed-State persistence as JSON files.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/state/
//! ├── bat.json
//! └── hhs-app.json
//! ```
//!
//! # Example State File
//!
//! ```json
//! {
//!   "version": "1.8.22",
//!   "prefix": "/home/user/.local/share/keg/cellar/hhs-app/1.8.22",
//!   "digest": "sha256:5a2f2c42f0038167fccdaf59cc8af59cc3aa7c2c2d0f3532e5724098196bff7f",
//!   "installed_at": 1760572800
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{InstalledState, StateError, StateStore};

const EXTENSION: &str = "json";

/// Stores one JSON record per formula in a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
  dir: PathBuf,
}

impl FileStateStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn record_path(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{}.{}", name, EXTENSION))
  }
}

impl StateStore for FileStateStore {
  fn get(&self, name: &str) -> Result<Option<InstalledState>, StateError> {
    let path = self.record_path(name);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(formula = %name, path = %path.display(), "no installed state");
        return Ok(None);
      }
      Err(source) => {
        return Err(StateError::Read {
          name: name.to_string(),
          source,
        });
      }
    };

    let state = serde_json::from_str(&content).map_err(|source| StateError::Parse {
      name: name.to_string(),
      source,
    })?;
    Ok(Some(state))
  }

  fn put(&mut self, name: &str, state: InstalledState) -> Result<(), StateError> {
    let path = self.record_path(name);
    let write_err = |source| StateError::Write {
      name: name.to_string(),
      source,
    };

    fs::create_dir_all(&self.dir).map_err(write_err)?;

    let content = serde_json::to_string_pretty(&state).map_err(|source| StateError::Serialize {
      name: name.to_string(),
      source,
    })?;

    // Write atomically: write to temp file, then rename
    let temp_path = self.dir.join(format!("{}.{}.tmp", name, EXTENSION));
    fs::write(&temp_path, &content).map_err(write_err)?;
    fs::rename(&temp_path, &path).map_err(write_err)?;

    info!(formula = %name, version = %state.version, path = %path.display(), "installed state saved");
    Ok(())
  }

  fn remove(&mut self, name: &str) -> Result<Option<InstalledState>, StateError> {
    let existing = self.get(name)?;
    if existing.is_none() {
      return Ok(None);
    }

    match fs::remove_file(self.record_path(name)) {
      Ok(()) => {
        info!(formula = %name, "installed state removed");
        Ok(existing)
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(existing),
      Err(source) => Err(StateError::Remove {
        name: name.to_string(),
        source,
      }),
    }
  }

  fn list(&self) -> Result<Vec<(String, InstalledState)>, StateError> {
    let entries = match fs::read_dir(&self.dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StateError::Read {
          name: self.dir.display().to_string(),
          source,
        });
      }
    };

    let mut names: Vec<String> = entries
      .flatten()
      .map(|entry| entry.path())
      .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
      .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
      .collect();
    names.sort();

    let mut records = Vec::with_capacity(names.len());
    for name in names {
      if let Some(state) = self.get(&name)? {
        records.push((name, state));
      }
    }
    Ok(records)
  }
}
