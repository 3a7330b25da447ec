//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

pub const VERSION: &str = "1.0.0";

/// Install procedure used unless a fixture sets its own.
const DEFAULT_INSTALL: &str = "mkdir -p ${prefix}/bin && cp README ${prefix}/";
const DEFAULT_TEST: &str = "test -f ${prefix}/README";

/// A formula written to the test formula directory.
///
/// The artifact is a local tarball containing `<name>-1.0.0/README`, served
/// through a `file://` URL.
pub struct Fixture {
  name: String,
  deps: Vec<String>,
  install: String,
  test: String,
  sha256: Option<String>,
}

impl Fixture {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      deps: Vec::new(),
      install: DEFAULT_INSTALL.to_string(),
      test: DEFAULT_TEST.to_string(),
      sha256: None,
    }
  }

  pub fn depends_on(mut self, deps: &[&str]) -> Self {
    self.deps = deps.iter().map(|d| d.to_string()).collect();
    self
  }

  /// Shell script run as the single install step.
  pub fn install(mut self, script: &str) -> Self {
    self.install = script.to_string();
    self
  }

  /// Shell script run as the acceptance test.
  pub fn test(mut self, script: &str) -> Self {
    self.test = script.to_string();
    self
  }

  /// Declare a digest instead of the artifact's real one.
  pub fn sha256(mut self, hex: &str) -> Self {
    self.sha256 = Some(hex.to_string());
    self
  }
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the keg root, the
/// formula directory and the artifacts.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root_path(&self) -> PathBuf {
    self.temp.path().join("root")
  }

  pub fn formula_path(&self) -> PathBuf {
    let p = self.temp.path().join("formula");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  fn artifact_path(&self) -> PathBuf {
    let p = self.temp.path().join("artifacts");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  /// Install prefix of a formula in the cellar.
  pub fn prefix(&self, name: &str) -> PathBuf {
    self.root_path().join("cellar").join(name).join(VERSION)
  }

  /// Whether the installed state has a record for `name`.
  pub fn is_recorded(&self, name: &str) -> bool {
    self.root_path().join("state").join(format!("{}.json", name)).exists()
  }

  /// Write the fixture's artifact and formula definition.
  pub fn add(&self, fixture: Fixture) {
    let archive = tarball(&fixture.name);
    let archive_path = self.artifact_path().join(format!("{}-{}.tar.gz", fixture.name, VERSION));
    std::fs::write(&archive_path, &archive).unwrap();

    let sha256 = fixture.sha256.unwrap_or_else(|| hex::encode(Sha256::digest(&archive)));
    let deps: Vec<String> = fixture.deps.iter().map(|d| toml_str(d)).collect();

    let definition = format!(
      r#"name = {name}
desc = "Test formula {raw_name}"
url = {url}
version = "{version}"
sha256 = "{sha256}"
license = "MIT"
depends_on = [{deps}]

[[install]]
program = "/bin/sh"
args = ["-c", {install}]

[test]
program = "/bin/sh"
args = ["-c", {test}]
"#,
      name = toml_str(&fixture.name),
      raw_name = fixture.name,
      url = toml_str(&format!("file://{}", archive_path.display())),
      version = VERSION,
      sha256 = sha256,
      deps = deps.join(", "),
      install = toml_str(&fixture.install),
      test = toml_str(&fixture.test),
    );

    std::fs::write(self.formula_path().join(format!("{}.toml", fixture.name)), definition).unwrap();
  }

  /// Get a pre-configured Command for the keg binary.
  ///
  /// Points `KEG_ROOT` and `KEG_FORMULA_PATH` at the temp directory and
  /// disables fetch retries.
  pub fn keg_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("keg");
    cmd.env("KEG_ROOT", self.root_path());
    cmd.env("KEG_FORMULA_PATH", self.formula_path());
    cmd.env("KEG_FETCH_RETRIES", "0");
    cmd.env("HOME", self.temp.path());
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

/// Gzipped tarball with a single `<name>-1.0.0/README`.
fn tarball(name: &str) -> Vec<u8> {
  let content = format!("{}\n", name);
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

  let mut header = tar::Header::new_gnu();
  header.set_size(content.len() as u64);
  header.set_mode(0o644);
  header.set_mtime(0);
  header.set_cksum();
  builder
    .append_data(&mut header, format!("{}-{}/README", name, VERSION), content.as_bytes())
    .unwrap();

  builder.into_inner().unwrap().finish().unwrap()
}

/// Quote a value as a TOML basic string.
fn toml_str(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
