//! Depth-first topological resolution with version selection.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::formula::version::compare_versions;
use crate::formula::{Formula, FormulaStore, VersionConstraint};
use crate::platform::Os;

use super::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Visiting,
  Visited,
}

/// One traversal of the graph under a fixed version selection.
struct Walk<'a> {
  order: Vec<&'a Formula>,
  /// Constraints placed on each name, in the order edges were traversed.
  constraints: BTreeMap<String, Vec<(String, VersionConstraint)>>,
  /// Version chosen for every name entered so far, including names on an
  /// aborted path.
  selected: BTreeMap<String, &'a Formula>,
}

/// Resolves targets against a formula store.
///
/// Edges restricted to other platforms are ignored; by default the resolver
/// targets the running OS.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
  store: &'a FormulaStore,
  os: Option<Os>,
}

/// Resolve `targets` for the running OS.
pub fn resolve<S: AsRef<str>>(store: &FormulaStore, targets: &[S]) -> Result<Vec<Formula>, ResolveError> {
  Resolver::new(store).resolve(targets)
}

impl<'a> Resolver<'a> {
  pub fn new(store: &'a FormulaStore) -> Self {
    Self {
      store,
      os: Os::current(),
    }
  }

  /// Resolve for `os`; `None` keeps every platform-restricted edge.
  pub fn for_os(mut self, os: Option<Os>) -> Self {
    self.os = os;
    self
  }

  pub fn os(&self) -> Option<Os> {
    self.os
  }

  /// Compute an install order in which every dependency precedes its dependents.
  ///
  /// Targets are visited in the given order and dependencies in declared order,
  /// so the result is deterministic. When several versions of a name are
  /// loaded, the newest one satisfying every constraint in the closure wins.
  ///
  /// # Errors
  ///
  /// - `UnresolvedDependency` for an unknown target or dependency name
  /// - `CyclicDependency` naming the cycle members in traversal order
  /// - `VersionConflict` when no loaded version satisfies the constraints on a name
  pub fn resolve<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<Formula>, ResolveError> {
    let targets: Vec<&str> = targets.iter().map(AsRef::as_ref).collect();
    let mut pinned: HashMap<String, &'a Formula> = HashMap::new();
    let mut last_conflict = None;

    // Each round either keeps the selection (done) or moves a name to a
    // different version; the store bounds how many distinct moves exist.
    // A cycle or missing name reached only through a version that the
    // constraints rule out is not reported; the walk is retried with the
    // reselected version instead.
    for round in 0..=self.store.len() {
      let (walk, outcome) = self.walk(&targets, &pinned);

      let mut changed = false;
      for (name, formula) in &walk.selected {
        let requirements = walk.constraints.get(name).map(Vec::as_slice).unwrap_or_default();
        let selected = self.select(name, requirements)?;
        if selected.version != formula.version {
          debug!(
            formula = %name,
            from = %formula.version,
            to = %selected.version,
            round,
            "reselecting version"
          );
          pinned.insert(name.clone(), selected);
          last_conflict = Some((name.clone(), requirements.to_vec()));
          changed = true;
        }
      }

      if !changed {
        outcome?;
        let order: Vec<Formula> = walk.order.into_iter().cloned().collect();
        debug!(
          targets = ?targets,
          order = ?order.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
          "resolved install order"
        );
        return Ok(order);
      }
    }

    let (formula, requirements) = last_conflict.unwrap_or_default();
    Err(self.conflict(&formula, &requirements))
  }

  /// Traverse from every target. The walk is returned even when traversal
  /// stopped early so its constraints can drive reselection.
  fn walk(&self, targets: &[&str], pinned: &HashMap<String, &'a Formula>) -> (Walk<'a>, Result<(), ResolveError>) {
    let mut walk = Walk {
      order: Vec::new(),
      constraints: BTreeMap::new(),
      selected: BTreeMap::new(),
    };
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut path: Vec<String> = Vec::new();

    let outcome = targets
      .iter()
      .try_for_each(|target| self.visit(target, None, pinned, &mut marks, &mut path, &mut walk));

    (walk, outcome)
  }

  fn visit(
    &self,
    name: &str,
    required_by: Option<&str>,
    pinned: &HashMap<String, &'a Formula>,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    walk: &mut Walk<'a>,
  ) -> Result<(), ResolveError> {
    match marks.get(name) {
      Some(Mark::Visited) => return Ok(()),
      Some(Mark::Visiting) => {
        let start = path.iter().position(|n| n == name).unwrap_or(0);
        return Err(ResolveError::CyclicDependency {
          cycle: path[start..].to_vec(),
        });
      }
      None => {}
    }

    let formula = match pinned.get(name) {
      Some(formula) => *formula,
      None => {
        let requirements = walk.constraints.get(name).map(Vec::as_slice).unwrap_or_default();
        self
          .select(name, requirements)
          .ok()
          .or_else(|| self.store.get(name))
          .ok_or_else(|| ResolveError::UnresolvedDependency {
            required_by: required_by.map(str::to_string),
            missing: name.to_string(),
          })?
      }
    };
    walk.selected.insert(name.to_string(), formula);

    trace!(formula = %formula.name, version = %formula.version, "visiting");
    marks.insert(name.to_string(), Mark::Visiting);
    path.push(name.to_string());

    for dep in formula.dependencies_for(self.os) {
      if let Some(constraint) = &dep.constraint {
        walk
          .constraints
          .entry(dep.name.clone())
          .or_default()
          .push((formula.name.clone(), constraint.clone()));
      }
      self.visit(&dep.name, Some(&formula.name), pinned, marks, path, walk)?;
    }

    path.pop();
    marks.insert(name.to_string(), Mark::Visited);
    walk.order.push(formula);
    Ok(())
  }

  /// Newest loaded version of `name` satisfying every requirement.
  fn select(&self, name: &str, requirements: &[(String, VersionConstraint)]) -> Result<&'a Formula, ResolveError> {
    self
      .store
      .versions(name)
      .into_iter()
      .filter(|f| requirements.iter().all(|(_, c)| c.matches(&f.version)))
      .max_by(|a, b| compare_versions(&a.version, &b.version))
      .ok_or_else(|| self.conflict(name, requirements))
  }

  fn conflict(&self, name: &str, requirements: &[(String, VersionConstraint)]) -> ResolveError {
    ResolveError::VersionConflict {
      formula: name.to_string(),
      requirements: requirements
        .iter()
        .map(|(requirer, c)| (requirer.clone(), c.to_string()))
        .collect(),
      available: self.store.versions(name).iter().map(|f| f.version.clone()).collect(),
    }
  }
}
