//! Formula lookup.
//!
//! The resolver never reads formula files itself; it asks a [`FormulaIndex`]
//! for formulas by name. [`MemoryIndex`] backs tests and embedding,
//! [`DirIndex`] serves `<name>.toml` / `<name>.json` files from a list of
//! directories searched in order.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::formula::{Formula, FormulaError, FormulaFormat};

#[derive(Debug, Error)]
pub enum IndexError {
  #[error("formula not found: {0}")]
  NotFound(String),

  #[error(transparent)]
  Formula(#[from] FormulaError),

  /// The file for `requested` declares a different name.
  #[error("formula file {} declares `{declared}` instead of `{requested}`", path.display())]
  NameMismatch {
    requested: String,
    declared: String,
    path: PathBuf,
  },

  #[error("failed to read formula directory {}: {source}", path.display())]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A queryable source of formula definitions.
pub trait FormulaIndex: Send + Sync {
  /// Look up a formula by name.
  fn resolve(&self, name: &str) -> Result<Formula, IndexError>;

  /// Names of all formulas the index knows about, sorted.
  fn names(&self) -> Result<Vec<String>, IndexError>;
}

/// An index held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
  formulas: BTreeMap<String, Formula>,
}

impl MemoryIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, formula: Formula) {
    self.formulas.insert(formula.name.clone(), formula);
  }
}

impl FromIterator<Formula> for MemoryIndex {
  fn from_iter<T: IntoIterator<Item = Formula>>(iter: T) -> Self {
    let mut index = MemoryIndex::new();
    for formula in iter {
      index.insert(formula);
    }
    index
  }
}

impl FormulaIndex for MemoryIndex {
  fn resolve(&self, name: &str) -> Result<Formula, IndexError> {
    self
      .formulas
      .get(name)
      .cloned()
      .ok_or_else(|| IndexError::NotFound(name.to_string()))
  }

  fn names(&self) -> Result<Vec<String>, IndexError> {
    Ok(self.formulas.keys().cloned().collect())
  }
}

/// An index over formula files in one or more directories.
///
/// Earlier directories shadow later ones. Within a directory `<name>.toml`
/// wins over `<name>.json`.
#[derive(Debug, Clone)]
pub struct DirIndex {
  dirs: Vec<PathBuf>,
}

const EXTENSIONS: &[&str] = &["toml", "json"];

impl DirIndex {
  pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
    Self {
      dirs: dirs.into_iter().collect(),
    }
  }

  pub fn dirs(&self) -> &[PathBuf] {
    &self.dirs
  }

  fn find(&self, name: &str) -> Option<PathBuf> {
    self.dirs.iter().find_map(|dir| {
      EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", name, ext)))
        .find(|path| path.is_file())
    })
  }
}

impl FormulaIndex for DirIndex {
  fn resolve(&self, name: &str) -> Result<Formula, IndexError> {
    // Names come from user input and dependency lists; never let them
    // escape the formula directories.
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
      return Err(IndexError::NotFound(name.to_string()));
    }

    let path = self.find(name).ok_or_else(|| IndexError::NotFound(name.to_string()))?;
    debug!(formula = %name, path = %path.display(), "resolved formula file");

    let formula = Formula::load(&path)?;
    if formula.name != name {
      return Err(IndexError::NameMismatch {
        requested: name.to_string(),
        declared: formula.name,
        path,
      });
    }
    Ok(formula)
  }

  fn names(&self) -> Result<Vec<String>, IndexError> {
    let mut names = Vec::new();
    for dir in &self.dirs {
      if !dir.is_dir() {
        continue;
      }
      let entries = fs::read_dir(dir).map_err(|source| IndexError::ReadDir {
        path: dir.clone(),
        source,
      })?;
      for entry in entries.flatten() {
        if let Some(name) = formula_name(&entry.path()) {
          names.push(name);
        }
      }
    }
    names.sort();
    names.dedup();
    Ok(names)
  }
}

fn formula_name(path: &Path) -> Option<String> {
  FormulaFormat::from_path(path)?;
  path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}
