//! List and info command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn list_json_contains_records() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "greeter"]).assert().success();

  let output = env.keg_cmd().args(["list", "--json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = json
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["greeter", "hello"]);
  assert_eq!(json[0]["dependencies"][0], "hello");
}

#[test]
fn list_text_shows_versions() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();

  env
    .keg_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0"));
}

#[test]
fn info_shows_formula_and_install() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "greeter"]).assert().success();

  env
    .keg_cmd()
    .args(["info", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0"))
    .stdout(predicate::str::contains("Prints a greeting"))
    .stdout(predicate::str::contains("Required by"))
    .stdout(predicate::str::contains("greeter"));
}

#[test]
fn info_json_for_uninstalled_formula() {
  let env = TestEnv::from_fixture("formulas");

  let output = env.keg_cmd().args(["info", "greeter", "--json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["formula"]["version"], "0.3");
  assert_eq!(json["formula"]["dependencies"][0]["name"], "hello");
  assert!(json["installed"].is_null());
}

#[test]
fn info_unknown_formula_fails() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .args(["info", "nonexistent"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("nonexistent"));
}
