//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture directory or file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with an isolated install root,
/// download cache, config directory and a writable copy of a fixture
/// formula directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create from a fixture formula directory.
  pub fn from_fixture(name: &str) -> Self {
    let env = Self::empty();
    let formulas = env.formulas_path();
    for entry in std::fs::read_dir(fixture_path(name)).unwrap() {
      let entry = entry.unwrap();
      std::fs::copy(entry.path(), formulas.join(entry.file_name())).unwrap();
    }
    env
  }

  /// Create an environment with an empty formula directory.
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    Self { temp }
  }

  /// Write a file relative to the formula directory.
  pub fn write_formula_file(&self, relative_path: &str, content: &str) {
    std::fs::write(self.formulas_path().join(relative_path), content).unwrap();
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn formulas_path(&self) -> PathBuf {
    self.dir("formulas")
  }

  /// Install root (isolated per test).
  pub fn root_path(&self) -> PathBuf {
    self.dir("root")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.dir("cache")
  }

  pub fn config_path(&self) -> PathBuf {
    self.dir("config")
  }

  pub fn bin_path(&self) -> PathBuf {
    self.root_path().join("bin")
  }

  pub fn registry_path(&self) -> PathBuf {
    self.root_path().join("registry.json")
  }

  /// Get a pre-configured Command for the keg binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `KEG_ROOT`: Isolated install root
  /// - `KEG_CACHE`: Isolated download cache
  /// - `KEG_FORMULA_PATH`: The copied fixture formulas
  /// - `XDG_CONFIG_HOME`: Isolated config directory, so no user config is read
  pub fn keg_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("keg");
    cmd.env("KEG_ROOT", self.root_path());
    cmd.env("KEG_CACHE", self.cache_path());
    cmd.env("KEG_FORMULA_PATH", self.formulas_path());
    cmd.env("XDG_CONFIG_HOME", self.config_path());
    cmd.env_remove("KEG_LOG");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
