//! Shared helpers for library integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use keg_lib::build::{ExecuteConfig, Installer};
use keg_lib::formula::FormulaStore;
use keg_lib::install::Orchestrator;
use keg_lib::platform::Os;
use keg_lib::platform::paths::Layout;
use keg_lib::registry::Registry;
use keg_lib::util::hash::hash_bytes;
use tempfile::TempDir;

/// An isolated install root plus a formula directory.
pub struct TestRoot {
  pub temp: TempDir,
  pub layout: Layout,
}

impl TestRoot {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let layout = Layout::new(temp.path().join("root"), temp.path().join("cache"));
    Self { temp, layout }
  }

  pub fn formulas_dir(&self) -> PathBuf {
    let dir = self.temp.path().join("formulas");
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  /// Write a source file next to the formulas and return its checksum.
  pub fn write_source(&self, file_name: &str, content: &str) -> String {
    let path = self.formulas_dir().join(file_name);
    std::fs::write(path, content).unwrap();
    hash_bytes(content.as_bytes()).0
  }

  pub fn write_formula(&self, file_name: &str, content: &str) {
    std::fs::write(self.formulas_dir().join(file_name), content).unwrap();
  }

  /// Write `<name>-<version>.toml` whose build installs `bin/<name>`, a script
  /// printing `<name> <version>`. `extra` is appended verbatim.
  pub fn script_formula(&self, name: &str, version: &str, deps: &[&str], extra: &str) {
    let source = format!("{name}-{version}.sh");
    let checksum = self.write_source(&source, &format!("#!/bin/sh\necho {name} {version}\n"));
    let deps: Vec<String> = deps.iter().map(|d| format!("{d:?}")).collect();
    self.write_formula(
      &format!("{name}-{version}.toml"),
      &format!(
        r#"
name = "{name}"
version = "{version}"
source_url = "{source}"
checksum = "{checksum}"
dependencies = [{deps}]
build_steps = [
  "mkdir -p $${{bin}}",
  "cp {source} $${{bin}}/{name}",
  "chmod +x $${{bin}}/{name}",
]
{extra}
"#,
        deps = deps.join(", ")
      ),
    );
  }

  pub fn store(&self) -> FormulaStore {
    FormulaStore::load_dirs(&[self.formulas_dir()]).unwrap()
  }

  pub fn registry(&self) -> Arc<Registry> {
    Arc::new(Registry::open(self.layout.clone()).unwrap())
  }

  pub fn orchestrator(&self) -> Orchestrator {
    self.orchestrator_with(ExecuteConfig::default())
  }

  pub fn orchestrator_with(&self, config: ExecuteConfig) -> Orchestrator {
    let installer = Installer::new(self.registry(), config).for_os(Some(Os::Linux));
    Orchestrator::new(self.store(), installer)
  }

  pub fn tmp_is_empty(&self) -> bool {
    std::fs::read_dir(self.layout.tmp_dir())
      .map(|mut entries| entries.next().is_none())
      .unwrap_or(true)
  }
}
