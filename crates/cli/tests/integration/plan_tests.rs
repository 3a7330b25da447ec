//! Plan and info command integration tests.

use predicates::prelude::*;

use super::common::{Fixture, TestEnv};

#[test]
fn plan_orders_dependencies_first() {
  let env = TestEnv::new();
  env.add(Fixture::new("base"));
  env.add(Fixture::new("left").depends_on(&["base"]));
  env.add(Fixture::new("right").depends_on(&["base"]));
  env.add(Fixture::new("top").depends_on(&["left", "right"]));

  let output = env.keg_cmd().args(["plan", "top"]).output().unwrap();
  assert!(output.status.success());

  let stdout = String::from_utf8(output.stdout).unwrap();
  let pos = |name: &str| stdout.find(&format!("+ {} ", name)).unwrap();
  assert!(pos("base") < pos("left"));
  assert!(pos("left") < pos("right"));
  assert!(pos("right") < pos("top"));
  assert_eq!(stdout.matches("+ base ").count(), 1);
  assert!(stdout.contains("4 formula(s) to install in 3 wave(s)"));
}

#[test]
fn plan_marks_installed_formulas() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  env.keg_cmd().args(["install", "lib"]).assert().success();

  env
    .keg_cmd()
    .args(["plan", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("= lib 1.0.0 (installed)"))
    .stdout(predicate::str::contains("+ app 1.0.0"));

  assert!(!env.is_recorded("app"));
}

#[test]
fn plan_json_lists_actions() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  let output = env
    .keg_cmd()
    .args(["--output", "json", "plan", "app"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(plan["target"], "app");
  assert_eq!(plan["entries"][0]["formula"]["name"], "lib");
  assert_eq!(plan["entries"][0]["action"], "install");
  assert_eq!(plan["entries"][1]["formula"]["name"], "app");
}

#[test]
fn formula_dir_flag_overrides_environment() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));

  env
    .keg_cmd()
    .env("KEG_FORMULA_PATH", env.temp.path().join("elsewhere"))
    .arg("--formula-dir")
    .arg(env.formula_path())
    .args(["plan", "lib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("+ lib 1.0.0"));
}

#[test]
fn info_shows_formula_details() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  env
    .keg_cmd()
    .args(["info", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("app: Test formula app"))
    .stdout(predicate::str::contains("Version: 1.0.0"))
    .stdout(predicate::str::contains("Dependencies: lib"))
    .stdout(predicate::str::contains("License: MIT"))
    .stdout(predicate::str::contains("Installed: no"));
}

#[test]
fn info_shows_installed_record() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));

  env.keg_cmd().args(["install", "lib"]).assert().success();

  env
    .keg_cmd()
    .args(["info", "lib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed: 1.0.0 in"));
}

#[test]
fn malformed_formula_is_rejected() {
  let env = TestEnv::new();
  std::fs::write(
    env.formula_path().join("bad.toml"),
    "name = \"bad\"\ndesc = \"missing everything else\"\n",
  )
  .unwrap();

  env.keg_cmd().args(["plan", "bad"]).assert().code(10);
}
