//! Install command integration tests.

use predicates::prelude::*;

use super::common::{Fixture, TestEnv};

/// `app` depends on `lib`.
fn app_with_lib(env: &TestEnv) {
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]));
}

#[test]
fn install_builds_dependencies_first() {
  let env = TestEnv::new();
  app_with_lib(&env);

  env
    .keg_cmd()
    .args(["install", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed lib 1.0.0"))
    .stdout(predicate::str::contains("Installed app 1.0.0"))
    .stdout(predicate::str::contains("Test passed: app"))
    .stdout(predicate::str::contains("Done: app"));

  assert!(env.prefix("lib").join("README").exists());
  assert!(env.prefix("app").join("README").exists());
  assert!(env.is_recorded("lib"));
  assert!(env.is_recorded("app"));
}

#[test]
fn second_install_is_a_no_op() {
  let env = TestEnv::new();
  app_with_lib(&env);

  env.keg_cmd().args(["install", "app"]).assert().success();

  env
    .keg_cmd()
    .args(["install", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Already installed: lib, app"))
    .stdout(predicate::str::contains("app is already installed"))
    .stdout(predicate::str::contains("Installed lib").not());
}

#[test]
fn dry_run_changes_nothing() {
  let env = TestEnv::new();
  app_with_lib(&env);

  env
    .keg_cmd()
    .args(["install", "app", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("+ lib 1.0.0"))
    .stdout(predicate::str::contains("Dry run: 2 formula(s) would be installed"));

  assert!(!env.root_path().join("cellar").exists());
  assert!(!env.is_recorded("lib"));
}

#[test]
fn digest_mismatch_keeps_installed_dependencies() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib"));
  env.add(Fixture::new("app").depends_on(&["lib"]).sha256(&"0".repeat(64)));

  env
    .keg_cmd()
    .args(["install", "app"])
    .assert()
    .code(21)
    .stdout(predicate::str::contains("Installed lib 1.0.0"))
    .stderr(predicate::str::contains("app failed at verify"))
    .stderr(predicate::str::contains("integrity mismatch"))
    .stderr(predicate::str::contains("Partial success: lib stay installed"));

  assert!(env.is_recorded("lib"));
  assert!(!env.is_recorded("app"));
  assert!(!env.prefix("app").exists());
}

#[test]
fn failing_install_step_removes_prefix() {
  let env = TestEnv::new();
  env.add(Fixture::new("broken").install("mkdir -p ${prefix}/bin && echo boom >&2 && exit 3"));

  env
    .keg_cmd()
    .args(["install", "broken"])
    .assert()
    .code(30)
    .stderr(predicate::str::contains("exited with 3"))
    .stderr(predicate::str::contains("boom"));

  assert!(!env.prefix("broken").exists());
  assert!(!env.is_recorded("broken"));
}

#[test]
fn slow_install_step_times_out() {
  let env = TestEnv::new();
  env.add(Fixture::new("slow").install("sleep 30"));

  env
    .keg_cmd()
    .env("KEG_STEP_TIMEOUT", "1s")
    .args(["install", "slow"])
    .assert()
    .code(31)
    .stderr(predicate::str::contains("timed out"));

  assert!(!env.is_recorded("slow"));
}

#[test]
fn failing_test_keeps_the_install() {
  let env = TestEnv::new();
  env.add(Fixture::new("flaky").test("echo nope && exit 1"));

  env
    .keg_cmd()
    .args(["install", "flaky"])
    .assert()
    .code(40)
    .stderr(predicate::str::contains("Test failed: flaky"));

  assert!(env.is_recorded("flaky"));
  assert!(env.prefix("flaky").join("README").exists());
}

#[test]
fn skip_test_ignores_failing_test() {
  let env = TestEnv::new();
  env.add(Fixture::new("flaky").test("exit 1"));

  env
    .keg_cmd()
    .args(["install", "flaky", "--skip-test"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Test passed").not());
}

#[test]
fn test_all_runs_dependency_tests() {
  let env = TestEnv::new();
  env.add(Fixture::new("lib").test("exit 1"));
  env.add(Fixture::new("app").depends_on(&["lib"]));

  env.keg_cmd().args(["install", "app"]).assert().success();

  let other = TestEnv::new();
  other.add(Fixture::new("lib").test("exit 1"));
  other.add(Fixture::new("app").depends_on(&["lib"]));

  other
    .keg_cmd()
    .args(["install", "app", "--test-all"])
    .assert()
    .code(40)
    .stdout(predicate::str::contains("Installed app 1.0.0"))
    .stderr(predicate::str::contains("Test failed: lib"))
    .stderr(predicate::str::contains("Partial success: lib, app stay installed"));

  assert!(other.is_recorded("lib"));
  assert!(other.is_recorded("app"));
  assert!(other.prefix("app").exists());
}

#[test]
fn cyclic_dependencies_fail_before_side_effects() {
  let env = TestEnv::new();
  env.add(Fixture::new("a").depends_on(&["b"]));
  env.add(Fixture::new("b").depends_on(&["a"]));

  env
    .keg_cmd()
    .args(["install", "a"])
    .assert()
    .code(12)
    .stderr(predicate::str::contains("dependency cycle: a -> b -> a"));

  assert!(!env.root_path().join("cellar").exists());
}

#[test]
fn missing_dependency_names_the_dependent() {
  let env = TestEnv::new();
  env.add(Fixture::new("app").depends_on(&["ghost"]));

  env
    .keg_cmd()
    .args(["install", "app"])
    .assert()
    .code(11)
    .stderr(predicate::str::contains("required by `app`"));
}

#[test]
fn json_report_describes_the_run() {
  let env = TestEnv::new();
  app_with_lib(&env);

  let output = env
    .keg_cmd()
    .args(["--output", "json", "install", "app"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["target"], "app");
  assert_eq!(report["state"]["state"], "done");
  assert_eq!(report["installed"], serde_json::json!(["lib", "app"]));
  assert_eq!(report["tests"][0]["formula"], "app");
  assert_eq!(report["tests"][0]["passed"], true);
  assert!(report["failure"].is_null());
}

#[test]
fn json_report_describes_the_failure() {
  let env = TestEnv::new();
  env.add(Fixture::new("app").sha256(&"0".repeat(64)));

  let output = env
    .keg_cmd()
    .args(["--output", "json", "install", "app"])
    .output()
    .unwrap();
  assert_eq!(output.status.code(), Some(21));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["failure"]["formula"], "app");
  assert_eq!(report["failure"]["stage"], "verify");
  assert_eq!(report["failure"]["kind"], "IntegrityMismatch");
  assert_eq!(report["state"]["state"], "failed");
}
