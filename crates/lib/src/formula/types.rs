//! Typed formula model.
//!
//! A [`Formula`] is an immutable value: once parsed and validated it is only
//! read. Formulas differ in field values, never in behavior.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::placeholder::{self, PlaceholderError, PlaceholderValues};

/// Hash algorithm of an integrity digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
  Sha256,
  Sha512,
}

impl DigestAlgorithm {
  /// Length of the hex encoding of a digest produced by this algorithm.
  pub fn hex_len(self) -> usize {
    match self {
      DigestAlgorithm::Sha256 => 64,
      DigestAlgorithm::Sha512 => 128,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      DigestAlgorithm::Sha256 => "sha256",
      DigestAlgorithm::Sha512 => "sha512",
    }
  }
}

impl fmt::Display for DigestAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DigestAlgorithm {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "sha256" => Ok(DigestAlgorithm::Sha256),
      "sha512" => Ok(DigestAlgorithm::Sha512),
      other => Err(format!("unsupported digest algorithm `{}`", other)),
    }
  }
}

/// Declared integrity digest of a source artifact.
///
/// The hex value is normalized to lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrityDigest {
  pub algorithm: DigestAlgorithm,
  pub hex: String,
}

impl IntegrityDigest {
  /// Create a digest, checking length and hex characters.
  pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self, String> {
    let hex = hex.trim();
    if hex.len() != algorithm.hex_len() {
      return Err(format!(
        "expected {} hex characters for {}, got {}",
        algorithm.hex_len(),
        algorithm,
        hex.len()
      ));
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err("contains non-hex characters".to_string());
    }
    Ok(Self {
      algorithm,
      hex: hex.to_ascii_lowercase(),
    })
  }

  /// Case-insensitive comparison against a computed hex digest.
  pub fn matches(&self, actual_hex: &str) -> bool {
    self.hex.eq_ignore_ascii_case(actual_hex)
  }
}

impl fmt::Display for IntegrityDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.hex)
  }
}

/// A single executable invocation: a program and its arguments.
///
/// There is no implicit shell. A formula that needs one names it as the
/// program (`program = "/bin/sh"`, `args = ["-c", "..."]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl Invocation {
  pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  /// Substitute placeholders in the program and every argument.
  pub fn render(&self, values: &PlaceholderValues) -> Result<Invocation, PlaceholderError> {
    Ok(Invocation {
      program: placeholder::substitute(&self.program, values)?,
      args: self
        .args
        .iter()
        .map(|arg| placeholder::substitute(arg, values))
        .collect::<Result<_, _>>()?,
    })
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.program)?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) {
        write!(f, " {:?}", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

/// What a successful acceptance test looks like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPredicate {
  pub exit_code: i32,
  pub stdout_contains: Option<String>,
}

impl Default for SuccessPredicate {
  fn default() -> Self {
    Self {
      exit_code: 0,
      stdout_contains: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
  pub invocation: Invocation,
  pub expect: SuccessPredicate,
}

/// Development source of a formula (informational).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadSource {
  pub url: String,
  pub branch: Option<String>,
}

/// The declared contract of one installable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
  pub name: String,
  pub desc: String,
  pub homepage: Option<String>,
  pub url: String,
  pub version: String,
  pub digest: IntegrityDigest,
  pub license: String,
  pub head: Option<HeadSource>,
  /// Dependency names in declaration order, without duplicates.
  pub dependencies: Vec<String>,
  pub install: Vec<Invocation>,
  pub test: TestSpec,
}

impl Formula {
  pub fn depends_on(&self, name: &str) -> bool {
    self.dependencies.iter().any(|d| d == name)
  }
}
