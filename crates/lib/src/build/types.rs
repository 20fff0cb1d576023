//! Types for formula build execution.
//!
//! This module defines the error type, the execution configuration and the
//! cancel flag shared between a caller and running builds.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::config::Config;
use crate::formula::StepId;
use crate::placeholder::PlaceholderError;
use crate::registry::{Lifecycle, LockError, RegistryError};

/// Errors that can occur while installing one formula.
///
/// Every variant names the formula it concerns.
#[derive(Debug, Error)]
pub enum BuildError {
  /// A build or post-install step exited unsuccessfully. Nothing was recorded.
  #[error("{formula}: step {step} failed with {}", ExitStatus(*.exit_status))]
  BuildFailed {
    formula: String,
    step: StepId,
    exit_status: Option<i32>,
  },

  /// A test step failed. The formula stays installed, recorded as broken.
  #[error("{formula}: test {step} failed with {}", ExitStatus(*.exit_status))]
  TestFailed {
    formula: String,
    step: StepId,
    exit_status: Option<i32>,
  },

  /// Staged artifact content does not match its declared checksum.
  #[error("{formula}: checksum mismatch for {artifact}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    formula: String,
    artifact: String,
    expected: String,
    actual: String,
  },

  /// None of an artifact's locations could be read.
  #[error("{formula}: source {artifact} unavailable (tried {})", .tried.join(", "))]
  SourceUnavailable {
    formula: String,
    artifact: String,
    tried: Vec<String>,
  },

  #[error("{formula}: dependency {dependency} is not installed")]
  DependencyNotInstalled { formula: String, dependency: String },

  /// Cancellation was requested; `step` is the step that did not start.
  #[error("{formula}: cancelled before {}", .step.as_ref().map(ToString::to_string).unwrap_or_else(|| "start".to_string()))]
  Cancelled { formula: String, step: Option<StepId> },

  #[error("{formula}: cannot move from {from} to {to}")]
  InvalidTransition {
    formula: String,
    from: Lifecycle,
    to: Lifecycle,
  },

  #[error("{formula}: {source}")]
  Placeholder {
    formula: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("{formula}: failed to unpack {path}: {source}")]
  Unpack {
    formula: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{formula}: {path}: {source}")]
  Io {
    formula: String,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

impl BuildError {
  pub(crate) fn io(formula: &str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> BuildError {
    let formula = formula.to_string();
    let path = path.into();
    move |source| BuildError::Io { formula, path, source }
  }
}

struct ExitStatus(Option<i32>);

impl fmt::Display for ExitStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(code) => write!(f, "exit status {code}"),
      None => f.write_str("a signal"),
    }
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of formulas to build in parallel.
  pub parallelism: usize,

  /// Shell used to run step strings. `None` means `/bin/sh`.
  pub shell: Option<String>,

  /// Search path appended after dependency `bin` directories.
  pub base_path: String,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self::from(&Config::default())
  }
}

impl From<&Config> for ExecuteConfig {
  fn from(config: &Config) -> Self {
    Self {
      parallelism: config.parallelism,
      shell: config.shell.clone(),
      base_path: config.base_path.clone(),
    }
  }
}

/// Shared cancellation request, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
