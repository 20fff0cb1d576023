//! Result and error types for multi-formula operations.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::build::BuildError;
use crate::formula::{Formula, FormulaError};
use crate::registry::{InstallRecord, RegistryError};
use crate::resolve::ResolveError;

/// Errors that abort a whole operation before or between formulas.
///
/// Failures of individual formulas are collected in the reports instead.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error(transparent)]
  Formula(#[from] FormulaError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Registry(#[from] RegistryError),
}

/// Outcome of installing a set of targets and their dependencies.
#[derive(Debug, Default)]
pub struct InstallReport {
  /// Newly built formulas, in the order they finished.
  pub installed: Vec<InstallRecord>,

  /// `(new record, previous version)`
  pub upgraded: Vec<(InstallRecord, String)>,

  /// Already installed; nothing ran.
  pub unchanged: Vec<InstallRecord>,

  /// Already installed but recorded as broken; nothing ran. Dependents are
  /// skipped until the formula is rebuilt with `force`.
  pub broken: Vec<InstallRecord>,

  /// Formulas whose own build failed.
  pub failed: Vec<(String, BuildError)>,

  /// Formulas not attempted, mapped to the failed dependency responsible.
  pub skipped: BTreeMap<String, String>,
}

impl InstallReport {
  /// Returns true if nothing failed, was skipped or is left broken.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && self.broken.is_empty()
  }

  /// Number of formulas the report covers.
  pub fn total(&self) -> usize {
    self.installed.len()
      + self.upgraded.len()
      + self.unchanged.len()
      + self.broken.len()
      + self.failed.len()
      + self.skipped.len()
  }

  pub fn failure(&self, name: &str) -> Option<&BuildError> {
    self.failed.iter().find(|(n, _)| n == name).map(|(_, e)| e)
  }
}

/// Outcome of uninstalling a set of formulas.
#[derive(Debug, Default)]
pub struct UninstallReport {
  pub removed: Vec<InstallRecord>,
  pub failed: Vec<(String, BuildError)>,
}

impl UninstallReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }
}

/// An installed formula with a newer loaded version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutdatedFormula {
  pub name: String,
  pub installed: String,
  pub latest: String,
}

/// What is known about one name: its newest formula and its install.
#[derive(Debug, Clone)]
pub struct FormulaInfo {
  pub name: String,
  pub formula: Option<Formula>,
  /// Every loaded version, in load order.
  pub versions: Vec<String>,
  pub record: Option<InstallRecord>,
  /// Installed formulas depending on this one.
  pub dependents: Vec<String>,
}
