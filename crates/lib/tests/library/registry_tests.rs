//! Registry persistence across instances.

use keg_lib::install::InstallError;
use keg_lib::registry::{InstallRecord, Registry, RegistryError};

use super::common::TestRoot;

#[test]
fn records_from_separate_instances_are_merged() {
  let root = TestRoot::new();
  let first = Registry::open(root.layout.clone()).unwrap();
  let second = Registry::open(root.layout.clone()).unwrap();

  first.record(InstallRecord::new("node", "18.0.0")).unwrap();
  second.record(InstallRecord::new("cdk8s", "2.1.10")).unwrap();

  let names: Vec<String> = root.registry().list().into_iter().map(|r| r.name).collect();
  assert_eq!(names, vec!["cdk8s", "node"]);
}

#[test]
fn corrupted_registry_is_never_repaired() {
  let root = TestRoot::new();
  std::fs::create_dir_all(root.layout.root()).unwrap();
  std::fs::write(root.layout.registry_path(), "{ \"version\": 1, \"formulas\": ").unwrap();

  let err = Registry::open(root.layout.clone()).unwrap_err();

  assert!(matches!(err, RegistryError::Corruption { .. }));
  assert_eq!(
    std::fs::read_to_string(root.layout.registry_path()).unwrap(),
    "{ \"version\": 1, \"formulas\": "
  );
}

#[tokio::test]
async fn corruption_after_open_stops_the_next_install() {
  let root = TestRoot::new();
  root.script_formula("a", "1.0", &[], "");
  let orch = root.orchestrator();
  std::fs::create_dir_all(root.layout.root()).unwrap();
  std::fs::write(root.layout.registry_path(), "not json").unwrap();

  let report = orch.install(&["a"], false).await.unwrap();

  assert!(matches!(
    report.failure("a"),
    Some(keg_lib::build::BuildError::Registry(RegistryError::Corruption { .. }))
  ));
  assert!(!root.layout.keg_path("a", "1.0").exists());
  assert!(matches!(orch.list(), Err(InstallError::Registry(RegistryError::Corruption { .. }))));
}

#[test]
fn registry_file_has_versioned_shape() {
  let root = TestRoot::new();
  let registry = root.registry();
  let mut record = InstallRecord::new("gcc@11", "11.3.0");
  record.dependencies = vec!["gmp".to_string(), "mpfr".to_string()];
  registry.record(record).unwrap();

  let json: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(root.layout.registry_path()).unwrap()).unwrap();

  assert_eq!(json["version"], 1);
  assert_eq!(json["formulas"]["gcc@11"]["version"], "11.3.0");
  assert_eq!(json["formulas"]["gcc@11"]["status"], "installed");
  assert_eq!(json["formulas"]["gcc@11"]["dependencies"][1], "mpfr");
}
