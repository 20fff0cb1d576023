//! Multi-formula operations.
//!
//! The [`Orchestrator`] drives the formula store, the resolver and the
//! installer over a set of targets:
//! 1. Resolves the targets into a dependency-first order (fail fast: nothing
//!    is built when resolution fails)
//! 2. Groups the order into waves of mutually independent formulas
//! 3. Installs each wave in parallel, bounded by `parallelism`
//! 4. Skips formulas whose dependency failed, while independent branches
//!    continue

mod types;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::build::{BuildError, InstallOutcome, Installer};
use crate::formula::{Formula, FormulaStore};
use crate::registry::{InstallRecord, Registry, RegistryError};
use crate::resolve::{ResolveError, Resolver, plan};

pub use types::{FormulaInfo, InstallError, InstallReport, OutdatedFormula, UninstallReport};

/// Runs installs, upgrades and uninstalls against one store and registry.
#[derive(Debug, Clone)]
pub struct Orchestrator {
  store: Arc<FormulaStore>,
  installer: Installer,
}

impl Orchestrator {
  pub fn new(store: FormulaStore, installer: Installer) -> Self {
    Self {
      store: Arc::new(store),
      installer,
    }
  }

  pub fn store(&self) -> &FormulaStore {
    &self.store
  }

  pub fn installer(&self) -> &Installer {
    &self.installer
  }

  pub fn registry(&self) -> &Registry {
    self.installer.registry()
  }

  /// Install `targets` and everything they depend on.
  ///
  /// `force` rebuilds the targets even when the same version is installed;
  /// dependencies are never forced. An installed dependency that satisfies
  /// every constraint placed on it is left as is.
  ///
  /// # Errors
  ///
  /// Only resolution errors are returned. Per-formula build failures are
  /// collected in the report.
  pub async fn install<S: AsRef<str>>(&self, targets: &[S], force: bool) -> Result<InstallReport, InstallError> {
    let os = self.installer.os();
    let resolved = Resolver::new(&self.store).for_os(os).resolve(targets)?;
    let waves = plan(&resolved, os)?;

    let target_names: HashSet<&str> = targets.iter().map(AsRef::as_ref).collect();
    info!(
      targets = ?target_names,
      formulas = resolved.len(),
      waves = waves.len(),
      "starting install"
    );

    let mut report = InstallReport::default();
    let mut failed: HashSet<String> = HashSet::new();
    let semaphore = Arc::new(Semaphore::new(self.installer.config().parallelism.max(1)));

    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(wave = wave_idx, formulas = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for formula in wave {
        if let Some(dep) = formula.dependencies_for(os).find(|d| failed.contains(&d.name)) {
          warn!(
            formula = %formula.name,
            failed_dep = %dep.name,
            "skipping formula due to failed dependency"
          );
          report.skipped.insert(formula.name.clone(), dep.name.clone());
          failed.insert(formula.name.clone());
          continue;
        }

        let is_target = target_names.contains(formula.name.as_str());
        if !is_target && let Some(record) = self.installed_dependency(formula, &resolved) {
          debug!(formula = %formula.name, version = %record.version, "dependency already installed");
          report.unchanged.push(record);
          continue;
        }

        ready.push(((*formula).clone(), force && is_target));
      }

      if ready.is_empty() {
        continue;
      }

      let names: Vec<String> = ready.iter().map(|(f, _)| f.name.clone()).collect();
      let mut results = execute_wave(ready, &self.installer, semaphore.clone()).await;

      for name in names {
        match results.remove(&name) {
          Some(Ok(InstallOutcome::Installed(record))) => report.installed.push(record),
          Some(Ok(InstallOutcome::Upgraded { record, previous })) => report.upgraded.push((record, previous)),
          Some(Ok(InstallOutcome::Unchanged(record))) if !record.is_usable() => {
            warn!(formula = %record.name, version = %record.version, "installed but broken");
            failed.insert(name);
            report.broken.push(record);
          }
          Some(Ok(InstallOutcome::Unchanged(record))) => report.unchanged.push(record),
          Some(Err(e)) => {
            failed.insert(name.clone());
            report.failed.push((name, e));
          }
          // The task panicked; already logged.
          None => {
            failed.insert(name);
          }
        }
      }
    }

    info!(
      installed = report.installed.len(),
      upgraded = report.upgraded.len(),
      unchanged = report.unchanged.len(),
      broken = report.broken.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "install complete"
    );

    Ok(report)
  }

  /// Uninstall `names`, dependents before the formulas they depend on.
  ///
  /// Stops at nothing: every name is attempted and failures are collected.
  pub async fn uninstall<S: AsRef<str>>(&self, names: &[S], force: bool) -> Result<UninstallReport, InstallError> {
    self.registry().reload()?;
    let mut report = UninstallReport::default();

    for name in self.removal_order(names) {
      match self.installer.uninstall(&name, force).await {
        Ok(record) => report.removed.push(record),
        Err(e) => {
          error!(formula = %name, error = %e, "uninstall failed");
          report.failed.push((name, e));
        }
      }
    }

    Ok(report)
  }

  /// Installed formulas with a newer loaded version, by name.
  ///
  /// Also refreshes the `outdated` status stored in the registry.
  pub fn outdated(&self) -> Result<Vec<OutdatedFormula>, InstallError> {
    self.registry().reload()?;
    let names = self.registry().refresh_outdated(&self.store)?;

    Ok(
      names
        .into_iter()
        .filter_map(|name| {
          let record = self.registry().lookup(&name)?;
          let latest = self.store.get(&name)?;
          Some(OutdatedFormula {
            name,
            installed: record.version,
            latest: latest.version.clone(),
          })
        })
        .collect(),
    )
  }

  /// Upgrade `names`, or every outdated formula when `names` is empty.
  ///
  /// Named formulas that are already current are reported unchanged.
  pub async fn upgrade<S: AsRef<str>>(&self, names: &[S]) -> Result<InstallReport, InstallError> {
    let outdated = self.outdated()?;
    let outdated_names: HashSet<&str> = outdated.iter().map(|o| o.name.as_str()).collect();

    let mut current = Vec::new();
    let targets: Vec<String> = if names.is_empty() {
      outdated.iter().map(|o| o.name.clone()).collect()
    } else {
      let mut targets = Vec::new();
      for name in names.iter().map(AsRef::as_ref) {
        let record = self
          .registry()
          .lookup(name)
          .ok_or_else(|| RegistryError::NotInstalled(name.to_string()))?;
        if outdated_names.contains(name) {
          targets.push(name.to_string());
        } else {
          info!(formula = %name, version = %record.version, "already up to date");
          current.push(record);
        }
      }
      targets
    };

    let mut report = if targets.is_empty() {
      info!("nothing to upgrade");
      InstallReport::default()
    } else {
      let report = self.install(&targets, false).await?;
      self.registry().refresh_outdated(&self.store)?;
      report
    };

    report.unchanged.extend(current);
    Ok(report)
  }

  /// All install records, with `outdated` status refreshed.
  pub fn list(&self) -> Result<Vec<InstallRecord>, InstallError> {
    self.registry().reload()?;
    self.registry().refresh_outdated(&self.store)?;
    Ok(self.registry().list())
  }

  /// What the store and registry know about `name`.
  pub fn info(&self, name: &str) -> Result<FormulaInfo, InstallError> {
    self.registry().reload()?;
    let formula = self.store.get(name).cloned();
    let record = self.registry().lookup(name);

    if formula.is_none() && record.is_none() {
      return Err(
        ResolveError::UnresolvedDependency {
          required_by: None,
          missing: name.to_string(),
        }
        .into(),
      );
    }

    Ok(FormulaInfo {
      name: name.to_string(),
      versions: self.store.versions(name).iter().map(|f| f.version.clone()).collect(),
      dependents: self.registry().dependents(name),
      formula,
      record,
    })
  }

  /// The usable record of a dependency that already satisfies every
  /// constraint the resolved set places on it.
  fn installed_dependency(&self, formula: &Formula, resolved: &[Formula]) -> Option<InstallRecord> {
    let record = self
      .registry()
      .lookup(&formula.name)
      .filter(InstallRecord::is_usable)?;

    let os = self.installer.os();
    let satisfied = resolved
      .iter()
      .flat_map(|f| f.dependencies_for(os))
      .filter(|d| d.name == formula.name)
      .all(|d| d.constraint.as_ref().is_none_or(|c| c.matches(&record.version)));

    satisfied.then_some(record)
  }

  /// Deduplicated `names`, each placed after every requested name that
  /// depends on it.
  fn removal_order<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
    let mut remaining: Vec<String> = Vec::new();
    for name in names.iter().map(AsRef::as_ref) {
      if !remaining.iter().any(|n| n == name) {
        remaining.push(name.to_string());
      }
    }

    let depends_on = |dependent: &str, name: &str| {
      self
        .registry()
        .lookup(dependent)
        .is_some_and(|r| r.dependencies.iter().any(|d| d == name))
    };

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
      let next = remaining
        .iter()
        .position(|name| !remaining.iter().any(|other| other != name && depends_on(other, name)))
        .unwrap_or(0);
      order.push(remaining.remove(next));
    }
    order
  }
}

/// Install one wave in parallel. Results are keyed by formula name; a task
/// that panicked has no entry.
async fn execute_wave(
  formulas: Vec<(Formula, bool)>,
  installer: &Installer,
  semaphore: Arc<Semaphore>,
) -> HashMap<String, Result<InstallOutcome, BuildError>> {
  let mut join_set = JoinSet::new();

  for (formula, force) in formulas {
    let installer = installer.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      // The semaphore is never closed, so the permit is always granted.
      let _permit = semaphore.acquire().await.ok();
      let result = installer.install(&formula, force).await;
      (formula.name, result)
    });
  }

  let mut results = HashMap::new();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((name, result)) => {
        results.insert(name, result);
      }
      Err(e) => {
        error!(error = %e, "install task panicked");
      }
    }
  }

  results
}
