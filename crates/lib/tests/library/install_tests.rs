//! End-to-end installs from formula files on disk.

use keg_lib::build::{BuildError, ExecuteConfig};
use keg_lib::formula::StepPhase;
use keg_lib::install::InstallError;
use keg_lib::registry::{InstallStatus, Lifecycle};
use keg_lib::resolve::ResolveError;

use super::common::TestRoot;

#[tokio::test]
async fn installing_b_installs_a_first() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], "");
  root.script_formula("b", "1.0", &["a"], "");
  let orch = root.orchestrator();

  let report = orch.install(&["b"], false).await.unwrap();

  let order: Vec<&str> = report.installed.iter().map(|r| r.name.as_str()).collect();
  assert_eq!(order, vec!["a", "b"]);
  let records = orch.registry().list();
  assert_eq!(records.len(), 2);
  assert!(records.iter().all(|r| r.status == InstallStatus::Installed));
  assert_eq!(orch.registry().lookup("b").unwrap().dependencies, vec!["a"]);

  let output = std::process::Command::new(root.layout.bin_dir().join("b")).output().unwrap();
  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "b 1.0");
}

#[tokio::test]
async fn mutual_dependency_is_a_cycle() {
  let root = TestRoot::new();
  root.script_formula("c", "1.0", &["d"], "");
  root.script_formula("d", "1.0", &["c"], "");
  let orch = root.orchestrator();

  let err = orch.install(&["c"], false).await.unwrap_err();

  let InstallError::Resolve(ResolveError::CyclicDependency { cycle }) = err else {
    panic!("expected a cycle, got {err:?}");
  };
  assert!(cycle.contains(&"c".to_string()));
  assert!(cycle.contains(&"d".to_string()));
  assert!(orch.registry().list().is_empty());
}

#[tokio::test]
async fn reinstall_is_idempotent() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], r#"post_install = "echo again >> $${root}/post-install.log""#);
  let orch = root.orchestrator();
  orch.install(&["a"], false).await.unwrap();
  let registry_before = std::fs::read_to_string(root.layout.registry_path()).unwrap();

  let report = orch.install(&["a"], false).await.unwrap();

  assert!(report.installed.is_empty());
  assert_eq!(report.unchanged.len(), 1);
  assert_eq!(std::fs::read_to_string(root.layout.registry_path()).unwrap(), registry_before);
  let log = std::fs::read_to_string(root.layout.root().join("post-install.log")).unwrap();
  assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn failed_step_leaves_no_record_and_no_working_directory() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], r#"test_step = "true""#);
  let checksum = root.write_source("broken.sh", "exit 1\n");
  root.write_formula(
    "broken.toml",
    &format!(
      r#"
name = "broken"
version = "0.1"
source_url = "broken.sh"
checksum = "{checksum}"
dependencies = ["a"]
build_steps = ["mkdir -p $${{prefix}}/lib", "sh broken.sh", "echo unreachable"]
"#
    ),
  );
  let orch = root.orchestrator();

  let report = orch.install(&["broken"], false).await.unwrap();

  match report.failure("broken") {
    Some(BuildError::BuildFailed { step, exit_status, .. }) => {
      assert_eq!(step.phase, StepPhase::Build);
      assert_eq!(step.index, 1);
      assert_eq!(*exit_status, Some(1));
    }
    other => panic!("expected BuildFailed, got {other:?}"),
  }
  assert!(orch.registry().lookup("broken").is_none());
  assert!(orch.registry().lookup("a").is_some());
  assert!(!root.layout.cellar_dir().join("broken").exists());
  assert!(root.tmp_is_empty());
  assert_eq!(orch.installer().lifecycle("broken"), Lifecycle::Absent);
}

#[tokio::test]
async fn checksum_mismatch_fails_before_any_step() {
  let root = TestRoot::new();
  root.write_source("tampered.sh", "echo tampered\n");
  root.write_formula(
    "tampered.toml",
    &format!(
      r#"
name = "tampered"
version = "1.0"
source_url = "tampered.sh"
checksum = "{}"
build_steps = ["touch $${{root}}/ran"]
"#,
      "a".repeat(64)
    ),
  );
  let orch = root.orchestrator();

  let report = orch.install(&["tampered"], false).await.unwrap();

  assert!(matches!(report.failure("tampered"), Some(BuildError::ChecksumMismatch { .. })));
  assert!(!root.layout.root().join("ran").exists());
}

#[tokio::test]
async fn concurrent_installs_of_the_same_name_record_once() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], "");
  let first = root.orchestrator();
  let second = root.orchestrator();

  let (r1, r2) = tokio::join!(first.install(&["a"], false), second.install(&["a"], false));
  let (r1, r2) = (r1.unwrap(), r2.unwrap());

  assert_eq!(r1.installed.len() + r2.installed.len(), 1);
  assert_eq!(r1.unchanged.len() + r2.unchanged.len(), 1);

  let reopened = root.registry();
  assert_eq!(reopened.list().len(), 1);
  let json: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(root.layout.registry_path()).unwrap()).unwrap();
  assert_eq!(json["formulas"].as_object().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_formulas_build_in_parallel_without_losing_records() {
  let root = TestRoot::new();
  let names = ["p1", "p2", "p3", "p4", "p5", "p6"];
  for name in names {
    root.script_formula(name, "1.0", &[], "");
  }
  let orch = root.orchestrator_with(ExecuteConfig {
    parallelism: 4,
    ..ExecuteConfig::default()
  });

  let report = orch.install(&names, false).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.installed.len(), names.len());
  assert_eq!(root.registry().list().len(), names.len());
}

#[tokio::test]
async fn failure_does_not_stop_independent_branch() {
  let root = TestRoot::new();
  root.script_formula("gmp", "6.2.1", &[], r#"test_step = "exit 3""#);
  root.script_formula("mpfr", "4.1.0", &["gmp"], "");
  root.script_formula("node", "18.0.0", &[], "");
  let orch = root.orchestrator();

  let report = orch.install(&["mpfr", "node"], false).await.unwrap();

  assert!(matches!(
    report.failure("gmp"),
    Some(BuildError::TestFailed { exit_status: Some(3), .. })
  ));
  assert_eq!(report.skipped.get("mpfr").map(String::as_str), Some("gmp"));
  assert_eq!(report.installed.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["node"]);
  assert_eq!(orch.registry().lookup("gmp").unwrap().status, InstallStatus::Broken);
}

#[tokio::test]
async fn forced_reinstall_repairs_broken_formula() {
  let root = TestRoot::new();
  root.script_formula("flaky", "1.0", &[], r#"test_step = "test -e $${root}/fixed""#);
  let orch = root.orchestrator();
  orch.install(&["flaky"], false).await.unwrap();
  assert_eq!(orch.installer().lifecycle("flaky"), Lifecycle::Broken);

  std::fs::write(root.layout.root().join("fixed"), "").unwrap();
  let report = orch.install(&["flaky"], true).await.unwrap();

  assert!(report.is_success());
  assert_eq!(orch.registry().lookup("flaky").unwrap().status, InstallStatus::Installed);
}

#[tokio::test]
async fn upgrade_moves_links_to_the_new_keg() {
  let root = TestRoot::new();
  root.script_formula("node", "16.0.0", &[], "");
  root.orchestrator().install(&["node"], false).await.unwrap();

  root.script_formula("node", "18.0.0", &[], "");
  let orch = root.orchestrator();
  assert_eq!(orch.outdated().unwrap().len(), 1);

  let report = orch.upgrade(&["node"]).await.unwrap();

  assert_eq!(report.upgraded.len(), 1);
  assert!(!root.layout.keg_path("node", "16.0.0").exists());
  let output = std::process::Command::new(root.layout.bin_dir().join("node")).output().unwrap();
  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "node 18.0.0");
}

#[tokio::test]
async fn uninstall_then_reinstall() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], "");
  let orch = root.orchestrator();
  orch.install(&["a"], false).await.unwrap();

  let report = orch.uninstall(&["a"], false).await.unwrap();
  assert!(report.is_success());
  assert!(!root.layout.keg_path("a", "1.0").exists());
  assert!(root.layout.bin_dir().join("a").symlink_metadata().is_err());

  let report = orch.install(&["a"], false).await.unwrap();
  assert_eq!(report.installed.len(), 1);
}
