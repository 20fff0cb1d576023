//! Outdated and upgrade command integration tests.

use keg_lib::util::hash::hash_bytes;
use predicates::prelude::*;

use super::common::TestEnv;

/// Add hello 2.0 next to the fixture's 1.0.
fn add_hello_2(env: &TestEnv) {
  let script = "#!/bin/sh\necho hello 2.0\n";
  env.write_formula_file("hello-2.0.sh", script);
  env.write_formula_file(
    "hello-2.toml",
    &format!(
      r#"
name = "hello"
version = "2.0"
source_url = "hello-2.0.sh"
checksum = "{}"
build_steps = ["mkdir -p $${{bin}}", "cp hello-2.0.sh $${{bin}}/hello", "chmod +x $${{bin}}/hello"]
"#,
      hash_bytes(script.as_bytes())
    ),
  );
}

#[test]
fn outdated_lists_newer_versions() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();
  add_hello_2(&env);

  env
    .keg_cmd()
    .arg("outdated")
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0"))
    .stdout(predicate::str::contains("2.0"));

  let output = env.keg_cmd().args(["outdated", "--json"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json[0]["name"], "hello");
  assert_eq!(json[0]["installed"], "1.0");
  assert_eq!(json[0]["latest"], "2.0");
}

#[test]
fn upgrade_installs_newest_version() {
  let env = TestEnv::from_fixture("formulas");
  env.keg_cmd().args(["install", "hello"]).assert().success();
  add_hello_2(&env);

  env
    .keg_cmd()
    .arg("upgrade")
    .assert()
    .success()
    .stdout(predicate::str::contains("Upgraded hello 1.0"));

  let output = std::process::Command::new(env.bin_path().join("hello")).output().unwrap();
  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello 2.0");
  assert!(!env.root_path().join("cellar/hello/1.0").exists());

  env
    .keg_cmd()
    .arg("outdated")
    .assert()
    .success()
    .stdout(predicate::str::contains("All formulas are up to date"));
}

#[test]
fn upgrade_with_nothing_installed_is_a_no_op() {
  let env = TestEnv::from_fixture("formulas");

  env
    .keg_cmd()
    .arg("upgrade")
    .assert()
    .success()
    .stdout(predicate::str::contains("All formulas are up to date"));
}
