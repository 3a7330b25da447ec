//! Placeholder parsing and substitution for invocation arguments.
//!
//! Install and test invocations reference paths that only exist once the
//! engine has prepared a sandbox for the formula. Arguments carry those
//! references as placeholders which are validated when the formula is parsed
//! and substituted right before the subprocess is spawned.
//!
//! # Placeholder Formats
//!
//! - `${prefix}` - the install target directory of the formula
//! - `${artifact}` - the verified source archive
//! - `${source}` - the directory the archive was staged into
//! - `${work}` - the sandbox working directory
//! - `${home}` - the `HOME` passed to the sandbox
//!
//! # Escaping
//!
//! Single `$` characters pass through unchanged, so `$HOME` inside a
//! `sh -c` argument is left for the shell. Use `$${` to produce a literal
//! `${`.
//!
//! # Example
//!
//! ```
//! use keg_lib::formula::placeholder::{parse, Placeholder, Segment};
//!
//! let segments = parse("${prefix}/bin:$PATH").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Placeholder(Placeholder::Prefix),
//!     Segment::Literal("/bin:$PATH".to_string()),
//! ]);
//! ```

use std::fmt;

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
  Prefix,
  Artifact,
  Source,
  Work,
  Home,
}

impl Placeholder {
  fn from_name(name: &str) -> Option<Self> {
    match name {
      "prefix" => Some(Placeholder::Prefix),
      "artifact" => Some(Placeholder::Artifact),
      "source" => Some(Placeholder::Source),
      "work" => Some(Placeholder::Work),
      "home" => Some(Placeholder::Home),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Placeholder::Prefix => "prefix",
      Placeholder::Artifact => "artifact",
      Placeholder::Source => "source",
      Placeholder::Work => "work",
      Placeholder::Home => "home",
    }
  }
}

impl fmt::Display for Placeholder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "${{{}}}", self.as_str())
  }
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder: ${{{0}}}")]
  Unknown(String),

  #[error("placeholder {0} is not available here")]
  NotAvailable(Placeholder),
}

/// Values substituted for placeholders.
///
/// A `None` value means the placeholder has no meaning in the current
/// context (e.g. `${artifact}` inside an acceptance test).
#[derive(Debug, Clone, Default)]
pub struct PlaceholderValues {
  pub prefix: Option<String>,
  pub artifact: Option<String>,
  pub source: Option<String>,
  pub work: Option<String>,
  pub home: Option<String>,
}

impl PlaceholderValues {
  fn get(&self, placeholder: Placeholder) -> Option<&str> {
    match placeholder {
      Placeholder::Prefix => self.prefix.as_deref(),
      Placeholder::Artifact => self.artifact.as_deref(),
      Placeholder::Source => self.source.as_deref(),
      Placeholder::Work => self.work.as_deref(),
      Placeholder::Home => self.home.as_deref(),
    }
  }
}

/// Parse a string containing placeholders into segments.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        if let Some((_, '{')) = chars.peek() {
          // escaped: $${ -> ${
          chars.next();
          literal.push_str("${");
        } else {
          literal.push_str("$$");
        }
      }
      Some((_, '{')) => {
        chars.next();

        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }

        let mut name = String::new();
        let mut found_close = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            found_close = true;
            break;
          }
          name.push(c);
        }

        if !found_close {
          return Err(PlaceholderError::Unclosed(pos));
        }

        let placeholder = Placeholder::from_name(name.trim()).ok_or(PlaceholderError::Unknown(name))?;
        segments.push(Segment::Placeholder(placeholder));
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Check that `input` only references placeholders from `allowed`.
pub fn validate(input: &str, allowed: &[Placeholder]) -> Result<(), PlaceholderError> {
  for segment in parse(input)? {
    if let Segment::Placeholder(p) = segment
      && !allowed.contains(&p)
    {
      return Err(PlaceholderError::NotAvailable(p));
    }
  }
  Ok(())
}

/// Substitute all placeholders in `input` with their values.
pub fn substitute(input: &str, values: &PlaceholderValues) -> Result<String, PlaceholderError> {
  let mut out = String::with_capacity(input.len());
  for segment in parse(input)? {
    match segment {
      Segment::Literal(s) => out.push_str(&s),
      Segment::Placeholder(p) => out.push_str(values.get(p).ok_or(PlaceholderError::NotAvailable(p))?),
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_plain_literal() {
    assert_eq!(parse("hello").unwrap(), vec![Segment::Literal("hello".to_string())]);
  }

  #[test]
  fn parse_placeholder_between_literals() {
    assert_eq!(
      parse("--prefix=${prefix}/opt").unwrap(),
      vec![
        Segment::Literal("--prefix=".to_string()),
        Segment::Placeholder(Placeholder::Prefix),
        Segment::Literal("/opt".to_string()),
      ]
    );
  }

  #[test]
  fn shell_variables_pass_through() {
    assert_eq!(parse("$HOME/$$").unwrap(), vec![Segment::Literal("$HOME/$$".to_string())]);
  }

  #[test]
  fn escaped_placeholder_is_literal() {
    assert_eq!(parse("$${prefix}").unwrap(), vec![Segment::Literal("${prefix}".to_string())]);
  }

  #[test]
  fn unclosed_placeholder_errors() {
    assert_eq!(parse("a ${prefix").unwrap_err(), PlaceholderError::Unclosed(2));
  }

  #[test]
  fn unknown_placeholder_errors() {
    assert_eq!(
      parse("${nope}").unwrap_err(),
      PlaceholderError::Unknown("nope".to_string())
    );
  }

  #[test]
  fn validate_rejects_disallowed() {
    let err = validate("${artifact}", &[Placeholder::Prefix, Placeholder::Home]).unwrap_err();
    assert_eq!(err, PlaceholderError::NotAvailable(Placeholder::Artifact));
    assert!(validate("${home}/x", &[Placeholder::Prefix, Placeholder::Home]).is_ok());
  }

  #[test]
  fn substitute_values() {
    let values = PlaceholderValues {
      prefix: Some("/cellar/bat/1.0".to_string()),
      home: Some("/home/me".to_string()),
      ..Default::default()
    };
    assert_eq!(
      substitute("${home}/.bin -> ${prefix}/bin", &values).unwrap(),
      "/home/me/.bin -> /cellar/bat/1.0/bin"
    );
  }

  #[test]
  fn substitute_missing_value_errors() {
    let err = substitute("${source}", &PlaceholderValues::default()).unwrap_err();
    assert_eq!(err, PlaceholderError::NotAvailable(Placeholder::Source));
  }
}
