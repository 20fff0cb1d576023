//! Formulas: declarative build recipes and the store that holds them.
//!
//! A formula is pure data. It names a package and version, lists the source
//! artifacts to stage (with SHA-256 checksums), the formulas it depends on and
//! the opaque shell steps that build, post-process and test it. Formulas are
//! loaded from TOML or JSON files and never change once loaded.

mod store;
mod types;
pub mod version;

use std::path::PathBuf;

use thiserror::Error;

pub use store::{FormulaSource, FormulaStore, SourceFormat, load};
pub use types::{BuildStep, Dependency, Formula, SourceArtifact, StepId, StepPhase};
pub use version::VersionConstraint;

/// Errors that can occur while loading formulas.
#[derive(Debug, Error)]
pub enum FormulaError {
  /// Required fields are absent or a field failed validation.
  #[error("malformed formula {origin}: {message}")]
  MalformedFormula { origin: String, message: String },

  /// The same name and version was loaded twice.
  #[error("duplicate formula: {name} {version}")]
  DuplicateFormula { name: String, version: String },

  #[error("unsupported formula file (expected .toml or .json): {0}")]
  UnsupportedFormat(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
