//! Install command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, fixture_path};

#[test]
fn install_builds_dependencies_first() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .args(["install", "greeter"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed hello 1.0"))
    .stdout(predicate::str::contains("Installed greeter 0.3"));

  let greeting = env.root_path().join("cellar/greeter/0.3/share/greeting");
  assert_eq!(std::fs::read_to_string(greeting).unwrap().trim(), "hello 1.0");
  assert!(env.bin_path().join("greeter").exists());
  assert!(env.bin_path().join("hello").exists());
}

#[test]
fn install_twice_is_a_no_op() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();
  let registry = std::fs::read_to_string(env.registry_path()).unwrap();

  env
    .keg_cmd()
    .args(["install", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0 is already installed"));

  assert_eq!(std::fs::read_to_string(env.registry_path()).unwrap(), registry);
}

#[test]
fn failed_build_exits_nonzero_and_names_step() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .args(["install", "broken"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("broken: step build[1]: sh broken.sh failed with exit status 4"));

  assert!(!env.root_path().join("cellar/broken").exists());
  let registry = std::fs::read_to_string(env.registry_path()).unwrap();
  assert!(registry.contains("\"hello\""));
  assert!(!registry.contains("\"broken\""));
}

#[test]
fn cycle_is_reported_and_nothing_is_installed() {
  let env = TestEnv::empty();

  env
    .keg_cmd()
    .arg("--formulas")
    .arg(fixture_path("cycle"))
    .args(["install", "c"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle"));

  assert!(!env.registry_path().exists());
}

#[test]
fn unknown_formula_fails() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .args(["install", "nonexistent"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no formula named 'nonexistent'"));
}

#[test]
fn malformed_formula_fails_to_load() {
  let env = TestEnv::from_fixture("formulas");
  env.write_formula_file("bad.toml", "name = \"bad\"\nversion = \"1\"\n");

  env
    .keg_cmd()
    .args(["install", "hello"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing required field"));
}

#[test]
fn force_rebuilds_installed_formula() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();

  env
    .keg_cmd()
    .args(["install", "--force", "--jobs", "1", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed hello 1.0"));
}
