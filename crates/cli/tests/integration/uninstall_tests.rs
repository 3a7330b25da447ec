//! Uninstall and list command integration tests.

use predicates::prelude::*;

use super::common::{Fixture, TestEnv};

#[test]
fn uninstall_removes_prefix_and_record() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));

  env.keg_cmd().args(["install", "lib"]).assert().success();
  assert!(env.prefix("lib").exists());

  env
    .keg_cmd()
    .args(["uninstall", "lib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled lib 1.0.0"));

  assert!(!env.prefix("lib").exists());
  assert!(!env.is_recorded("lib"));
}

#[test]
fn uninstall_refuses_while_required() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  env.keg_cmd().args(["install", "app"]).assert().success();

  env
    .keg_cmd()
    .args(["uninstall", "lib"])
    .assert()
    .code(60)
    .stderr(predicate::str::contains("`lib` is required by app"));
  assert!(env.is_recorded("lib"));

  env.keg_cmd().args(["uninstall", "lib", "--force"]).assert().success();
  assert!(!env.is_recorded("lib"));
  assert!(env.is_recorded("app"));
}

#[test]
fn uninstall_then_reinstall() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));

  env.keg_cmd().args(["install", "lib"]).assert().success();
  env.keg_cmd().args(["uninstall", "lib"]).assert().success();

  env
    .keg_cmd()
    .args(["install", "lib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed lib 1.0.0"));
}

#[test]
fn list_shows_installed_formulas() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  env.keg_cmd().args(["install", "app"]).assert().success();

  let output = env.keg_cmd().arg("list").output().unwrap();
  assert!(output.status.success());

  let stdout = String::from_utf8(output.stdout).unwrap();
  let lines: Vec<&str> = stdout.lines().collect();
  assert_eq!(lines.len(), 2);
  assert!(lines[0].starts_with("app 1.0.0 "));
  assert!(lines[1].starts_with("lib 1.0.0 "));
}

#[test]
fn list_json_includes_records() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));

  env.keg_cmd().args(["install", "lib"]).assert().success();

  let output = env
    .keg_cmd()
    .args(["--output", "json", "list"])
    .output()
    .unwrap();
  let items: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(items[0]["name"], "lib");
  assert_eq!(items[0]["record"]["version"], "1.0.0");
}
