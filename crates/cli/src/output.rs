//! CLI output formatting.
//!
//! Text mode prints one status line per event with a colored symbol. Status
//! lines for successes and plans go to stdout, errors and warnings to stderr.
//! JSON mode prints a single pretty document on stdout.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use keg_lib::formula::IntegrityDigest;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  /// Plan entry that will be installed.
  pub const ADD: &str = "+";
  /// Plan entry already satisfied.
  pub const SKIP: &str = "=";
}

/// Number of hex characters shown for a digest.
const DIGEST_DISPLAY_LEN: usize = 12;

/// `algorithm:hex` with the hex shortened for display.
pub fn short_digest(digest: &IntegrityDigest) -> String {
  let len = digest.hex.len().min(DIGEST_DISPLAY_LEN);
  format!("{}:{}", digest.algorithm, &digest.hex[..len])
}

/// Step durations rounded to milliseconds, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  if millis == 0 {
    return "<1ms".to_string();
  }
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// `  Label: value`, label dimmed.
pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// A plan line: `  + name version` for pending entries, a dimmed
/// `  = name version (installed)` for satisfied ones.
pub fn print_plan_entry(pending: bool, name: &str, version: &str) {
  if pending {
    println!(
      "  {} {} {}",
      symbols::ADD.if_supports_color(Stream::Stdout, |s| s.green()),
      name,
      version
    );
  } else {
    let line = format!("{} {} {} (installed)", symbols::SKIP, name, version);
    println!("  {}", line.if_supports_color(Stream::Stdout, |s| s.dimmed()));
  }
}

/// An indented detail line with a dimmed suffix, e.g. a step and its duration.
pub fn print_detail(text: impl Display, suffix: &str) {
  println!(
    "    {} {}",
    text,
    format!("({})", suffix).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
