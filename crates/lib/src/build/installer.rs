//! Single formula installation.
//!
//! Installs one formula whose dependencies are already installed: stage its
//! sources into a scoped build context, run its steps in order, link its
//! executables and record the result. Any failure before the record is
//! written tears everything down again.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::formula::{BuildStep, Formula, StepId, StepPhase};
use crate::placeholder;
use crate::platform::Os;
use crate::platform::paths::Layout;
use crate::registry::{FileLock, InstallRecord, InstallStatus, Lifecycle, Registry, RegistryError};
use crate::util::fs::{list_files, prune_empty_parents, remove_dir_if_exists};

use super::context::{BuildContext, DependencyKeg};
use super::link::link_executables;
use super::stage::{ArchiveKind, stage_artifact, unpack};
use super::step::execute_step;
use super::types::{BuildError, CancelFlag, ExecuteConfig};

/// What an install request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
  /// Built and recorded; nothing of this name was installed before, or a
  /// forced rebuild replaced the same version.
  Installed(InstallRecord),
  /// Replaced an installed different version.
  Upgraded { record: InstallRecord, previous: String },
  /// The same version was already installed; nothing ran.
  Unchanged(InstallRecord),
}

impl InstallOutcome {
  pub fn record(&self) -> &InstallRecord {
    match self {
      InstallOutcome::Installed(record) | InstallOutcome::Unchanged(record) => record,
      InstallOutcome::Upgraded { record, .. } => record,
    }
  }
}

/// Builds and removes formulas against one registry.
#[derive(Debug, Clone)]
pub struct Installer {
  layout: Layout,
  registry: Arc<Registry>,
  config: ExecuteConfig,
  cancel: CancelFlag,
  os: Option<Os>,
  states: Arc<Mutex<HashMap<String, Lifecycle>>>,
}

impl Installer {
  pub fn new(registry: Arc<Registry>, config: ExecuteConfig) -> Self {
    Self {
      layout: registry.layout().clone(),
      registry,
      config,
      cancel: CancelFlag::new(),
      os: Os::current(),
      states: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  /// Target OS for platform-restricted dependencies.
  pub fn for_os(mut self, os: Option<Os>) -> Self {
    self.os = os;
    self
  }

  pub fn registry(&self) -> &Arc<Registry> {
    &self.registry
  }

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  pub fn cancel_flag(&self) -> &CancelFlag {
    &self.cancel
  }

  pub fn os(&self) -> Option<Os> {
    self.os
  }

  /// Current lifecycle state of `name`, including in-flight operations.
  pub fn lifecycle(&self, name: &str) -> Lifecycle {
    if let Some(state) = self.states.lock().unwrap_or_else(PoisonError::into_inner).get(name) {
      return *state;
    }
    self
      .registry
      .lookup(name)
      .map(|r| r.lifecycle())
      .unwrap_or(Lifecycle::Absent)
  }

  /// Install `formula`.
  ///
  /// The same version already installed is returned unchanged unless `force`
  /// is set. A different installed version is upgraded: the new keg is built
  /// first and the old files are removed only once it is recorded.
  ///
  /// # Errors
  ///
  /// `BuildFailed`, `ChecksumMismatch`, `SourceUnavailable`, `Cancelled` and
  /// `DependencyNotInstalled` leave no record, keg or links behind (a previous
  /// version stays installed). `TestFailed` is returned after the formula was
  /// recorded as broken.
  pub async fn install(&self, formula: &Formula, force: bool) -> Result<InstallOutcome, BuildError> {
    let _lock = FileLock::acquire_async(
      self.layout.name_lock_path(&formula.name),
      format!("install {formula}"),
    )
    .await?;
    self.registry.reload()?;

    let existing = self.registry.lookup(&formula.name);
    if let Some(record) = &existing
      && record.version == formula.version
      && !force
    {
      debug!(formula = %formula.name, version = %formula.version, "already installed");
      return Ok(InstallOutcome::Unchanged(record.clone()));
    }

    let from = existing.as_ref().map(InstallRecord::lifecycle).unwrap_or(Lifecycle::Absent);
    let to = match from {
      Lifecycle::Installed => Lifecycle::Upgrading,
      _ => Lifecycle::Building,
    };
    let _state = self.enter(&formula.name, from, to)?;

    if self.cancel.is_cancelled() {
      return Err(BuildError::Cancelled {
        formula: formula.name.clone(),
        step: None,
      });
    }

    let deps = self.dependency_kegs(formula)?;

    info!(
      formula = %formula.name,
      version = %formula.version,
      previous = ?existing.as_ref().map(|r| r.version.as_str()),
      "building"
    );

    match self.build(formula, existing.as_ref(), deps).await {
      Ok(outcome) => {
        info!(formula = %formula.name, version = %formula.version, "installed");
        Ok(outcome)
      }
      Err(e @ BuildError::TestFailed { .. }) => {
        warn!(formula = %formula.name, error = %e, "installed but tests failed, recorded as broken");
        Err(e)
      }
      Err(e) => {
        error!(formula = %formula.name, error = %e, "install failed, rolled back");
        Err(e)
      }
    }
  }

  /// Remove `name` and its files.
  ///
  /// Refuses while other installed formulas depend on it unless `force`.
  pub async fn uninstall(&self, name: &str, force: bool) -> Result<InstallRecord, BuildError> {
    let _lock = FileLock::acquire_async(self.layout.name_lock_path(name), format!("uninstall {name}")).await?;
    self.registry.reload()?;

    let record = self
      .registry
      .lookup(name)
      .ok_or_else(|| RegistryError::NotInstalled(name.to_string()))?;
    let _state = self.enter(name, record.lifecycle(), Lifecycle::Uninstalling)?;

    let removed = self.registry.remove(name, force)?;
    info!(formula = %name, version = %removed.version, "uninstalled");
    Ok(removed)
  }

  fn enter(&self, name: &str, from: Lifecycle, to: Lifecycle) -> Result<StateGuard, BuildError> {
    let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
    let current = states.get(name).copied().unwrap_or(from);
    if !current.can_transition_to(to) {
      return Err(BuildError::InvalidTransition {
        formula: name.to_string(),
        from: current,
        to,
      });
    }
    states.insert(name.to_string(), to);
    debug!(formula = %name, from = %current, to = %to, "lifecycle transition");
    Ok(StateGuard {
      name: name.to_string(),
      states: self.states.clone(),
    })
  }

  /// Kegs of every dependency, direct ones first, then their dependencies.
  fn dependency_kegs(&self, formula: &Formula) -> Result<Vec<DependencyKeg>, BuildError> {
    let mut kegs = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for dep in formula.dependencies_for(self.os) {
      let record = self
        .registry
        .lookup(&dep.name)
        .filter(|r| r.is_usable())
        .filter(|r| dep.constraint.as_ref().is_none_or(|c| c.matches(&r.version)))
        .ok_or_else(|| BuildError::DependencyNotInstalled {
          formula: formula.name.clone(),
          dependency: dep.to_string(),
        })?;

      if seen.insert(record.name.clone()) {
        queue.extend(record.dependencies.iter().cloned());
        kegs.push(DependencyKeg {
          keg: self.layout.keg_path(&record.name, &record.version),
          name: record.name,
        });
      }
    }

    while let Some(name) = queue.pop_front() {
      if !seen.insert(name.clone()) {
        continue;
      }
      if let Some(record) = self.registry.lookup(&name) {
        queue.extend(record.dependencies.iter().cloned());
        kegs.push(DependencyKeg {
          keg: self.layout.keg_path(&record.name, &record.version),
          name: record.name,
        });
      }
    }

    Ok(kegs)
  }

  async fn build(
    &self,
    formula: &Formula,
    existing: Option<&InstallRecord>,
    deps: Vec<DependencyKeg>,
  ) -> Result<InstallOutcome, BuildError> {
    let keg = self.layout.keg_path(&formula.name, &formula.version);

    let backup = existing
      .filter(|r| r.version == formula.version)
      .map(|_| self.layout.tmp_dir().join(format!("{}-{}.backup", formula.name, formula.version)));
    let guard = KegGuard::prepare(&keg, self.layout.root(), backup).map_err(BuildError::io(&formula.name, &keg))?;

    let mut ctx = BuildContext::new(&self.layout, formula, deps, &self.config.base_path)
      .map_err(BuildError::io(&formula.name, self.layout.tmp_dir()))?;
    debug!(formula = %formula.name, context = %ctx.path().display(), "created build context");

    self.stage(formula, &mut ctx).await?;
    self.run_phase(formula, &ctx, StepPhase::Build, &formula.build_steps).await?;

    let bin_dir = self.layout.bin_dir();
    let links = link_executables(&keg, &self.layout.cellar_dir().join(&formula.name), &bin_dir)
      .map_err(BuildError::io(&formula.name, &bin_dir))?;

    self
      .run_phase(formula, &ctx, StepPhase::PostInstall, &formula.post_install)
      .await?;

    let test_failure = match self.run_phase(formula, &ctx, StepPhase::Test, &formula.test_steps).await {
      Ok(()) => None,
      Err(e @ BuildError::TestFailed { .. }) => Some(e),
      Err(e) => return Err(e),
    };

    let mut files = list_files(&keg).map_err(BuildError::io(&formula.name, &keg))?;
    files.extend(links.links());

    let mut record = InstallRecord::new(&formula.name, &formula.version);
    record.files = files;
    record.dependencies = formula
      .dependencies_for(self.os)
      .filter(|d| !d.build_only)
      .map(|d| d.name.clone())
      .collect();
    if test_failure.is_some() {
      record.status = InstallStatus::Broken;
    }

    let previous = self.registry.replace(record.clone())?;
    guard.commit();
    links.commit();
    drop(ctx);

    if let Some(e) = test_failure {
      return Err(e);
    }

    Ok(match previous {
      Some(previous) if previous.version != record.version => InstallOutcome::Upgraded {
        record,
        previous: previous.version,
      },
      _ => InstallOutcome::Installed(record),
    })
  }

  /// Stage the primary source (unpacking archives) and then every resource
  /// into the directory steps run in.
  async fn stage(&self, formula: &Formula, ctx: &mut BuildContext) -> Result<(), BuildError> {
    let staging = ctx.staging_dir();
    let downloads = self.layout.downloads_dir();

    let primary = stage_artifact(formula, &formula.source, &downloads, &staging).await?;
    let src = match ArchiveKind::from_file_name(&formula.source.file_name()) {
      Some(kind) => unpack(&formula.name, &primary, kind, &staging).await?,
      None => staging,
    };

    for resource in &formula.resources {
      stage_artifact(formula, resource, &downloads, &src).await?;
    }

    ctx.set_src(src);
    Ok(())
  }

  async fn run_phase(
    &self,
    formula: &Formula,
    ctx: &BuildContext,
    phase: StepPhase,
    steps: &[BuildStep],
  ) -> Result<(), BuildError> {
    for (index, step) in steps.iter().enumerate() {
      let id = StepId::new(phase, index, &step.run);

      if self.cancel.is_cancelled() {
        return Err(BuildError::Cancelled {
          formula: formula.name.clone(),
          step: Some(id),
        });
      }

      let placeholder_err = |source| BuildError::Placeholder {
        formula: formula.name.clone(),
        source,
      };
      let cmd = placeholder::substitute(&step.run, ctx).map_err(placeholder_err)?;
      let env = ctx.step_env(&formula.env, step).map_err(placeholder_err)?;
      let cwd = ctx.step_dir(step).map_err(placeholder_err)?;

      debug!(formula = %formula.name, step = %id, "running step");
      let output = execute_step(&cmd, &env, &cwd, self.config.shell.as_deref())
        .await
        .map_err(BuildError::io(&formula.name, &cwd))?;

      if !output.success {
        let (formula, exit_status) = (formula.name.clone(), output.exit_status);
        return Err(match phase {
          StepPhase::Test => BuildError::TestFailed {
            formula,
            step: id,
            exit_status,
          },
          _ => BuildError::BuildFailed {
            formula,
            step: id,
            exit_status,
          },
        });
      }
    }

    Ok(())
  }
}

/// Clears the in-flight lifecycle state of one name on drop.
struct StateGuard {
  name: String,
  states: Arc<Mutex<HashMap<String, Lifecycle>>>,
}

impl Drop for StateGuard {
  fn drop(&mut self) {
    self
      .states
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.name);
  }
}

/// Owns a keg directory while it is being built.
///
/// Dropped without [`KegGuard::commit`], it removes the keg and, for a
/// rebuild of an installed version, moves the previous keg back.
struct KegGuard {
  keg: PathBuf,
  root: PathBuf,
  backup: Option<PathBuf>,
  committed: bool,
}

impl KegGuard {
  fn prepare(keg: &Path, root: &Path, backup: Option<PathBuf>) -> io::Result<Self> {
    match &backup {
      Some(backup) => {
        remove_dir_if_exists(backup)?;
        if keg.exists() {
          if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent)?;
          }
          std::fs::rename(keg, backup)?;
        }
      }
      // Leftover from an interrupted build.
      None => remove_dir_if_exists(keg)?,
    }
    std::fs::create_dir_all(keg)?;

    Ok(Self {
      keg: keg.to_path_buf(),
      root: root.to_path_buf(),
      backup,
      committed: false,
    })
  }

  fn commit(mut self) {
    self.committed = true;
    if let Some(backup) = &self.backup
      && let Err(e) = remove_dir_if_exists(backup)
    {
      warn!(path = %backup.display(), error = %e, "failed to remove previous keg");
    }
  }
}

impl Drop for KegGuard {
  fn drop(&mut self) {
    if self.committed {
      return;
    }

    if let Err(e) = remove_dir_if_exists(&self.keg) {
      warn!(keg = %self.keg.display(), error = %e, "failed to remove partial keg");
    }

    match &self.backup {
      Some(backup) if backup.exists() => {
        if let Err(e) = std::fs::rename(backup, &self.keg) {
          warn!(keg = %self.keg.display(), error = %e, "failed to restore previous keg");
        }
      }
      _ => prune_empty_parents(&self.keg, &self.root),
    }
  }
}
