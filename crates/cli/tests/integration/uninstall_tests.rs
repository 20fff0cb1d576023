//! Uninstall command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn uninstall_removes_keg_and_links() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();

  env
    .keg_cmd()
    .args(["uninstall", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled hello 1.0"));

  assert!(!env.root_path().join("cellar/hello").exists());
  assert!(env.bin_path().join("hello").symlink_metadata().is_err());
}

#[test]
fn uninstall_refuses_required_formula() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "greeter"]).assert().success();

  env
    .keg_cmd()
    .args(["uninstall", "hello"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("hello is required by greeter"));

  env
    .keg_cmd()
    .args(["uninstall", "--ignore-dependencies", "hello"])
    .assert()
    .success();
}

#[test]
fn uninstall_orders_dependents_first() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "greeter"]).assert().success();

  env.keg_cmd().args(["uninstall", "hello", "greeter"]).assert().success();

  env
    .keg_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No formulas installed"));
}

#[test]
fn uninstall_unknown_fails() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .args(["uninstall", "hello"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("hello is not installed"));
}
