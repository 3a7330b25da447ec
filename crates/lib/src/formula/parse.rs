//! Parsing raw formula definitions into [`Formula`] values.
//!
//! Definitions are TOML or JSON documents:
//!
//! ```toml
//! name = "hhs-app"
//! desc = "HomeSetup - The ultimate Terminal experience"
//! homepage = "https://github.com/HS-Teams/homebrew-homesetup"
//! url = "https://github.com/HS-Teams/homebrew-homesetup/archive/v1.8.22.tar.gz"
//! sha256 = "5a2f2c42f0038167fccdaf59cc8af59cc3aa7c2c2d0f3532e5724098196bff7f"
//! license = "MIT"
//! depends_on = ["git", "bat"]
//!
//! [[install]]
//! program = "/bin/sh"
//! args = ["-c", "./install.bash --prefix ${prefix}"]
//!
//! [test]
//! program = "${prefix}/bin/hhs.bash"
//! args = ["--version"]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::FormulaError;
use super::placeholder::{self, Placeholder};
use super::types::{
  DigestAlgorithm, Formula, HeadSource, IntegrityDigest, Invocation, SuccessPredicate, TestSpec,
};

/// Placeholders usable by install steps.
const INSTALL_PLACEHOLDERS: &[Placeholder] = &[
  Placeholder::Prefix,
  Placeholder::Artifact,
  Placeholder::Source,
  Placeholder::Work,
  Placeholder::Home,
];

/// Placeholders usable by the acceptance test.
const TEST_PLACEHOLDERS: &[Placeholder] = &[Placeholder::Prefix, Placeholder::Work, Placeholder::Home];

/// Archive suffixes stripped when deriving a version from a URL.
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".tar", ".zip"];

const SOURCE_SCHEMES: &[&str] = &["http", "https", "file"];
const HEAD_SCHEMES: &[&str] = &["http", "https", "git", "ssh", "file"];

/// Version used when none is declared and none can be derived.
const UNKNOWN_VERSION: &str = "latest";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormula {
  name: Option<String>,
  desc: Option<String>,
  homepage: Option<String>,
  url: Option<String>,
  version: Option<String>,
  sha256: Option<String>,
  digest: Option<RawDigest>,
  license: Option<String>,
  head: Option<RawHead>,
  #[serde(default)]
  depends_on: Vec<String>,
  #[serde(default)]
  install: Vec<RawInvocation>,
  test: Option<RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDigest {
  algorithm: String,
  hex: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHead {
  url: String,
  branch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInvocation {
  program: Option<String>,
  #[serde(default)]
  args: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
  program: Option<String>,
  #[serde(default)]
  args: Vec<String>,
  expect_exit: Option<i32>,
  expect_stdout: Option<String>,
}

/// Source format of a formula definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaFormat {
  Toml,
  Json,
}

impl FormulaFormat {
  /// Pick the format from a file extension.
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension().and_then(|e| e.to_str()) {
      Some("toml") => Some(FormulaFormat::Toml),
      Some("json") => Some(FormulaFormat::Json),
      _ => None,
    }
  }
}

impl Formula {
  /// Parse a TOML formula definition.
  pub fn from_toml_str(input: &str) -> Result<Formula, FormulaError> {
    let raw: RawFormula = toml::from_str(input).map_err(|e| FormulaError::Syntax {
      origin: "<toml>".to_string(),
      message: e.to_string(),
    })?;
    validate(raw)
  }

  /// Parse a JSON formula definition.
  pub fn from_json_str(input: &str) -> Result<Formula, FormulaError> {
    let raw: RawFormula = serde_json::from_str(input).map_err(|e| FormulaError::Syntax {
      origin: "<json>".to_string(),
      message: e.to_string(),
    })?;
    validate(raw)
  }

  /// Load a formula file, choosing the format by extension.
  pub fn load(path: &Path) -> Result<Formula, FormulaError> {
    let format = FormulaFormat::from_path(path).ok_or_else(|| FormulaError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| FormulaError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    debug!(path = %path.display(), ?format, "loading formula");

    let parsed = match format {
      FormulaFormat::Toml => Formula::from_toml_str(&content),
      FormulaFormat::Json => Formula::from_json_str(&content),
    };

    parsed.map_err(|e| match e {
      FormulaError::Syntax { message, .. } => FormulaError::Syntax {
        origin: path.display().to_string(),
        message,
      },
      other => other,
    })
  }
}

fn validate(raw: RawFormula) -> Result<Formula, FormulaError> {
  let name = raw.name.unwrap_or_default();
  let label = if name.is_empty() { "<unnamed>".to_string() } else { name.clone() };
  let malformed = |field: &str, reason: String| FormulaError::Malformed {
    formula: label.clone(),
    field: field.to_string(),
    reason,
  };

  if name.is_empty() {
    return Err(malformed("name", "is missing".to_string()));
  }
  if !is_valid_name(&name) {
    return Err(malformed(
      "name",
      format!("`{}` must start with an alphanumeric and contain only [A-Za-z0-9@+._-]", name),
    ));
  }

  let desc = required(raw.desc).ok_or_else(|| malformed("desc", "is missing".to_string()))?;
  let license = required(raw.license).ok_or_else(|| malformed("license", "is missing".to_string()))?;

  let url = required(raw.url).ok_or_else(|| malformed("url", "is missing".to_string()))?;
  check_url(&url, SOURCE_SCHEMES).map_err(|reason| malformed("url", reason))?;

  let digest = match (raw.sha256, raw.digest) {
    (Some(_), Some(_)) => {
      return Err(malformed("digest", "`sha256` and `digest` are mutually exclusive".to_string()));
    }
    (Some(hex), None) => {
      IntegrityDigest::new(DigestAlgorithm::Sha256, &hex).map_err(|reason| malformed("sha256", reason))?
    }
    (None, Some(raw_digest)) => {
      let algorithm: DigestAlgorithm = raw_digest
        .algorithm
        .parse()
        .map_err(|reason| malformed("digest.algorithm", reason))?;
      IntegrityDigest::new(algorithm, &raw_digest.hex).map_err(|reason| malformed("digest.hex", reason))?
    }
    (None, None) => return Err(malformed("sha256", "is missing".to_string())),
  };

  let version = match required(raw.version) {
    Some(v) => v,
    None => version_from_url(&url).unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
  };
  if !is_valid_version(&version) {
    return Err(malformed(
      "version",
      format!("`{}` cannot be used as a directory name", version.escape_debug()),
    ));
  }

  let mut seen = HashSet::new();
  let mut dependencies = Vec::with_capacity(raw.depends_on.len());
  for dep in raw.depends_on {
    let dep = dep.trim().to_string();
    if dep.is_empty() {
      return Err(malformed("depends_on", "contains an empty name".to_string()));
    }
    if seen.insert(dep.clone()) {
      dependencies.push(dep);
    } else {
      debug!(formula = %name, dependency = %dep, "ignoring duplicate dependency");
    }
  }

  if raw.install.is_empty() {
    return Err(malformed("install", "must contain at least one step".to_string()));
  }
  let install = raw
    .install
    .into_iter()
    .enumerate()
    .map(|(i, step)| {
      let field = format!("install[{}]", i);
      let program = required(step.program).ok_or_else(|| malformed(&field, "has no program".to_string()))?;
      let invocation = Invocation::new(program, step.args);
      check_placeholders(&invocation, INSTALL_PLACEHOLDERS).map_err(|reason| malformed(&field, reason))?;
      Ok(invocation)
    })
    .collect::<Result<Vec<_>, FormulaError>>()?;

  let raw_test = raw.test.ok_or_else(|| malformed("test", "is missing".to_string()))?;
  let program = required(raw_test.program).ok_or_else(|| malformed("test", "has no program".to_string()))?;
  let invocation = Invocation::new(program, raw_test.args);
  check_placeholders(&invocation, TEST_PLACEHOLDERS).map_err(|reason| malformed("test", reason))?;
  let test = TestSpec {
    invocation,
    expect: SuccessPredicate {
      exit_code: raw_test.expect_exit.unwrap_or(0),
      stdout_contains: raw_test.expect_stdout.filter(|s| !s.is_empty()),
    },
  };

  let head = match raw.head {
    Some(head) => {
      check_url(&head.url, HEAD_SCHEMES).map_err(|reason| malformed("head.url", reason))?;
      Some(HeadSource {
        url: head.url,
        branch: head.branch,
      })
    }
    None => None,
  };

  Ok(Formula {
    name,
    desc,
    homepage: required(raw.homepage),
    url,
    version,
    digest,
    license,
    head,
    dependencies,
    install,
    test,
  })
}

fn required(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn is_valid_name(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
    && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '+' | '.' | '_' | '-'))
}

/// A version names a directory under the cellar, so it must be a single
/// plain path segment.
pub(crate) fn is_valid_version(version: &str) -> bool {
  !version.is_empty() && version != "." && version != ".." && !version.contains(['/', '\\', '\0'])
}

fn check_url(url: &str, schemes: &[&str]) -> Result<(), String> {
  let parsed = reqwest::Url::parse(url).map_err(|e| format!("`{}` is not a valid URL: {}", url, e))?;
  if schemes.contains(&parsed.scheme()) {
    Ok(())
  } else {
    Err(format!("unsupported URL scheme `{}`", parsed.scheme()))
  }
}

fn check_placeholders(invocation: &Invocation, allowed: &[Placeholder]) -> Result<(), String> {
  if invocation.program.trim().is_empty() {
    return Err("has an empty program".to_string());
  }
  std::iter::once(&invocation.program)
    .chain(invocation.args.iter())
    .try_for_each(|s| placeholder::validate(s, allowed))
    .map_err(|e| e.to_string())
}

/// Derive a version from the archive name at the end of a URL.
///
/// `.../archive/v1.8.22.tar.gz` gives `1.8.22`, `.../bat-0.24.0.tgz` gives
/// `0.24.0`.
pub fn version_from_url(url: &str) -> Option<String> {
  let last = url.rsplit('/').next()?;
  let last = last.split(['?', '#']).next().unwrap_or(last);

  let stem = ARCHIVE_SUFFIXES
    .iter()
    .find_map(|suffix| last.strip_suffix(suffix))
    .unwrap_or(last);

  let candidate = stem.rsplit(['-', '_']).next().unwrap_or(stem);
  let candidate = candidate.strip_prefix('v').unwrap_or(candidate);

  if candidate.starts_with(|c: char| c.is_ascii_digit()) {
    Some(candidate.to_string())
  } else {
    None
  }
}
