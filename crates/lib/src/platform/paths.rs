//! Directory layout for the install root, download cache and configuration.
//!
//! Every location honours an environment override first (`KEG_ROOT`,
//! `KEG_CACHE`, `KEG_FORMULA_PATH`) and falls back to the XDG base
//! directories.

use std::path::{Path, PathBuf};

use crate::consts::{APP_NAME, REGISTRY_FILENAME};

/// Returns the user's home directory
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var("KEG_CACHE") {
    return PathBuf::from(path);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the install root holding kegs, links, locks and the registry.
pub fn root_dir() -> PathBuf {
  if let Ok(path) = std::env::var("KEG_ROOT") {
    return PathBuf::from(path);
  }
  data_dir()
}

/// Formula directories listed in `KEG_FORMULA_PATH` (colon separated).
pub fn formula_dirs_from_env() -> Vec<PathBuf> {
  std::env::var_os("KEG_FORMULA_PATH")
    .map(|value| std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
    .unwrap_or_default()
}

/// Concrete on-disk layout used by the registry and the build executor.
///
/// ```text
/// {root}/
/// ├── registry.json        # name -> InstallRecord
/// ├── cellar/<name>/<ver>/ # one keg per installed version
/// ├── bin/                 # links to keg executables
/// ├── locks/<name>.lock    # per-name install locks
/// └── tmp/                 # build contexts
/// {cache}/downloads/       # <sha256>--<filename> source artifacts
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  root: PathBuf,
  cache: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      cache: cache.into(),
    }
  }

  /// Layout from `KEG_ROOT`/`KEG_CACHE` or the XDG defaults.
  pub fn from_env() -> Self {
    Self::new(root_dir(), cache_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn cache(&self) -> &Path {
    &self.cache
  }

  pub fn registry_path(&self) -> PathBuf {
    self.root.join(REGISTRY_FILENAME)
  }

  pub fn cellar_dir(&self) -> PathBuf {
    self.root.join("cellar")
  }

  /// Keg directory for one installed version.
  pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
    self.cellar_dir().join(name).join(version)
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.root.join("bin")
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.root.join("locks")
  }

  /// Per-name install lock.
  pub fn name_lock_path(&self, name: &str) -> PathBuf {
    self.locks_dir().join(format!("{name}.lock"))
  }

  /// Guards read-modify-write cycles of `registry.json`.
  pub fn registry_lock_path(&self) -> PathBuf {
    self.locks_dir().join("registry.lock")
  }

  pub fn tmp_dir(&self) -> PathBuf {
    self.root.join("tmp")
  }

  pub fn downloads_dir(&self) -> PathBuf {
    self.cache.join("downloads")
  }
}
