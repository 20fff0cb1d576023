//! Installation registry.
//!
//! # Storage Layout
//!
//! ```text
//! {root}/
//! ├── registry.json        # { "version": 1, "formulas": { name: InstallRecord } }
//! └── locks/
//!     ├── registry.lock    # held across each read-modify-write
//!     └── <name>.lock      # held for a whole install/upgrade/uninstall
//! ```

mod lock;
mod storage;
mod types;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use lock::{FileLock, LockError, LockMetadata};
pub use storage::Registry;
pub use types::{InstallRecord, InstallStatus, Lifecycle, RegistryFile};

/// Errors from reading or mutating the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// `registry.json` exists but cannot be trusted. Never repaired silently.
  #[error("registry corrupted at {path}: {message}")]
  Corruption { path: PathBuf, message: String },

  #[error("{0} is not installed")]
  NotInstalled(String),

  #[error("{name} is required by {}", .dependents.join(", "))]
  HasDependents { name: String, dependents: Vec<String> },

  #[error("failed to read registry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write registry {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize registry: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to remove {path}: {source}")]
  RemoveFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] LockError),
}
