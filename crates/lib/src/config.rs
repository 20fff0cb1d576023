//! User configuration.
//!
//! Loaded from `{config_dir}/config.toml` when the file exists. Every field is
//! optional; missing fields take the defaults below.
//!
//! ```toml
//! parallelism = 4
//! shell = "/bin/bash"
//! base_path = "/usr/bin:/bin"
//! formula_dirs = ["~/formulas"]
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DEFAULT_BASE_PATH;
use crate::platform::paths::{config_dir, formula_dirs_from_env, home_dir};

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid config {path}: parallelism must be at least 1")]
  ZeroParallelism { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Maximum number of formulas built at the same time.
  pub parallelism: usize,

  /// Shell used to run steps. `None` means `/bin/sh`.
  pub shell: Option<String>,

  /// Search path appended after dependency `bin` directories.
  pub base_path: String,

  /// Directories scanned for formula files.
  pub formula_dirs: Vec<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      shell: None,
      base_path: DEFAULT_BASE_PATH.to_string(),
      formula_dirs: Vec::new(),
    }
  }
}

impl Config {
  /// Path of the default configuration file.
  pub fn default_path() -> PathBuf {
    config_dir().join(CONFIG_FILENAME)
  }

  /// Load the default configuration file, then apply `KEG_FORMULA_PATH`.
  ///
  /// A missing file yields the defaults.
  pub fn load_default() -> Result<Self, ConfigError> {
    let path = Self::default_path();
    let mut config = if path.exists() { Self::load(&path)? } else { Self::default() };

    let env_dirs = formula_dirs_from_env();
    if !env_dirs.is_empty() {
      config.formula_dirs = env_dirs;
    }

    Ok(config)
  }

  /// Load a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content, path)
  }

  fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let mut config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if config.parallelism == 0 {
      return Err(ConfigError::ZeroParallelism { path: path.to_path_buf() });
    }

    config.formula_dirs = config.formula_dirs.into_iter().map(expand_tilde).collect();
    Ok(config)
  }
}

fn expand_tilde(path: PathBuf) -> PathBuf {
  match path.strip_prefix("~") {
    Ok(rest) => home_dir().join(rest),
    Err(_) => path,
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
