//! Formula model.
//!
//! A formula declares one installable unit: where its source lives and how
//! to check it, what it depends on, how to install it and how to smoke-test
//! the result.

pub mod parse;
pub mod placeholder;
pub mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use parse::{FormulaFormat, version_from_url};
pub use types::{
  DigestAlgorithm, Formula, HeadSource, IntegrityDigest, Invocation, SuccessPredicate, TestSpec,
};

/// Errors raised while reading or validating a formula definition.
#[derive(Debug, Error)]
pub enum FormulaError {
  /// A required field is missing or holds an invalid value.
  #[error("malformed formula `{formula}`: field `{field}` {reason}")]
  Malformed {
    formula: String,
    field: String,
    reason: String,
  },

  /// The document is not valid TOML/JSON or has unknown fields.
  #[error("failed to parse formula {origin}: {message}")]
  Syntax { origin: String, message: String },

  #[error("failed to read formula {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("unsupported formula file format: {}", .0.display())]
  UnsupportedFormat(PathBuf),
}
