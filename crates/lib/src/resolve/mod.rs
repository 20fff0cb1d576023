//! Dependency resolution.
//!
//! Turns a set of requested formula names into a dependency-first install
//! order, then groups that order into waves that may build in parallel.

mod plan;
mod resolver;

use thiserror::Error;

pub use plan::plan;
pub use resolver::{Resolver, resolve};

/// Errors raised while resolving a dependency graph.
///
/// All of these are configuration errors: nothing is built when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
  /// The graph contains a cycle; members are listed in traversal order.
  #[error("dependency cycle: {}", format_cycle(.cycle))]
  CyclicDependency { cycle: Vec<String> },

  /// A requested or required name has no formula.
  #[error("{}", format_unresolved(.required_by.as_deref(), .missing))]
  UnresolvedDependency {
    required_by: Option<String>,
    missing: String,
  },

  /// No loaded version of `formula` satisfies every constraint placed on it.
  #[error(
    "no version of '{formula}' satisfies {} (available: {})",
    format_requirements(.requirements),
    .available.join(", ")
  )]
  VersionConflict {
    formula: String,
    /// `(requirer, constraint)` pairs.
    requirements: Vec<(String, String)>,
    available: Vec<String>,
  },
}

impl ResolveError {
  /// Formula names this error is about.
  pub fn formulas(&self) -> Vec<&str> {
    match self {
      ResolveError::CyclicDependency { cycle } => cycle.iter().map(String::as_str).collect(),
      ResolveError::UnresolvedDependency { required_by, missing } => {
        required_by.iter().map(String::as_str).chain([missing.as_str()]).collect()
      }
      ResolveError::VersionConflict { formula, .. } => vec![formula.as_str()],
    }
  }
}

fn format_cycle(cycle: &[String]) -> String {
  let mut names = cycle.to_vec();
  if let Some(first) = cycle.first() {
    names.push(first.clone());
  }
  names.join(" -> ")
}

fn format_unresolved(required_by: Option<&str>, missing: &str) -> String {
  match required_by {
    Some(requirer) => format!("'{requirer}' depends on '{missing}', which has no formula"),
    None => format!("no formula named '{missing}'"),
  }
}

fn format_requirements(requirements: &[(String, String)]) -> String {
  requirements
    .iter()
    .map(|(requirer, constraint)| format!("{constraint} (required by {requirer})"))
    .collect::<Vec<_>>()
    .join(", ")
}
