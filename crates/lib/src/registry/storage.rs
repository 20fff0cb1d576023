//! The installation registry: `{root}/registry.json` plus an in-memory view.
//!
//! Reads are served from memory. Every mutation takes the registry-wide file
//! lock, re-reads the file so records written by other processes are kept,
//! applies the change, and rewrites the file atomically (temp file, fsync,
//! rename).

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::consts::REGISTRY_VERSION;
use crate::formula::FormulaStore;
use crate::formula::version::compare_versions;
use crate::platform::paths::Layout;
use crate::util::fs::{prune_empty_parents, remove_dir_if_exists, remove_file_if_exists};

use super::RegistryError;
use super::lock::FileLock;
use super::types::{InstallRecord, InstallStatus, RegistryFile};

/// Tracks installed formulas and owns their files.
#[derive(Debug)]
pub struct Registry {
  layout: Layout,
  records: RwLock<BTreeMap<String, InstallRecord>>,
}

impl Registry {
  /// Open the registry under `layout`'s root.
  ///
  /// A missing file is an empty registry. A file that does not parse is
  /// `Corruption` and is left untouched.
  pub fn open(layout: Layout) -> Result<Self, RegistryError> {
    let records = read_file(&layout.registry_path())?;
    debug!(path = %layout.registry_path().display(), count = records.len(), "opened registry");
    Ok(Self {
      layout,
      records: RwLock::new(records),
    })
  }

  pub fn layout(&self) -> &Layout {
    &self.layout
  }

  pub fn lookup(&self, name: &str) -> Option<InstallRecord> {
    self.read().get(name).cloned()
  }

  /// All records, ordered by name.
  pub fn list(&self) -> Vec<InstallRecord> {
    self.read().values().cloned().collect()
  }

  /// Installed formulas that list `name` as a dependency.
  pub fn dependents(&self, name: &str) -> Vec<String> {
    dependents_in(&self.read(), name)
  }

  /// Persist `record`, replacing any record with the same name.
  pub fn record(&self, record: InstallRecord) -> Result<(), RegistryError> {
    let name = record.name.clone();
    let version = record.version.clone();
    let status = record.status;
    self.mutate(|records| {
      records.insert(record.name.clone(), record);
      Ok(())
    })?;
    info!(formula = %name, version = %version, status = %status, "recorded install");
    Ok(())
  }

  /// Persist `record` and delete the previous record's files that the new
  /// one does not also track. Returns the previous record.
  pub fn replace(&self, record: InstallRecord) -> Result<Option<InstallRecord>, RegistryError> {
    let layout = self.layout.clone();
    let previous = self.mutate(|records| {
      let previous = records.insert(record.name.clone(), record.clone());
      if let Some(old) = &previous {
        let stale: Vec<&PathBuf> = old.files.iter().filter(|f| !record.files.contains(f)).collect();
        delete_files(&layout, stale)?;
        if old.version != record.version {
          let keg = layout.keg_path(&old.name, &old.version);
          remove_dir_if_exists(&keg).map_err(|source| RegistryError::RemoveFile { path: keg.clone(), source })?;
          prune_empty_parents(&keg, layout.root());
        }
      }
      Ok(previous)
    })?;

    info!(
      formula = %record.name,
      version = %record.version,
      previous = ?previous.as_ref().map(|p| p.version.as_str()),
      "replaced install"
    );
    Ok(previous)
  }

  /// Delete the tracked files of `name` and drop its record.
  ///
  /// Refuses with `HasDependents` while other installed formulas depend on
  /// `name`, unless `force` is set.
  pub fn remove(&self, name: &str, force: bool) -> Result<InstallRecord, RegistryError> {
    let layout = self.layout.clone();
    let removed = self.mutate(|records| {
      let Some(record) = records.get(name) else {
        return Err(RegistryError::NotInstalled(name.to_string()));
      };

      let dependents = dependents_in(records, name);
      if !dependents.is_empty() {
        if !force {
          return Err(RegistryError::HasDependents {
            name: name.to_string(),
            dependents,
          });
        }
        warn!(formula = %name, dependents = ?dependents, "removing formula that others depend on");
      }

      delete_files(&layout, record.files.iter())?;
      let keg = layout.keg_path(&record.name, &record.version);
      remove_dir_if_exists(&keg).map_err(|source| RegistryError::RemoveFile { path: keg.clone(), source })?;
      prune_empty_parents(&keg, layout.root());

      records
        .remove(name)
        .ok_or_else(|| RegistryError::NotInstalled(name.to_string()))
    })?;

    info!(formula = %name, version = %removed.version, files = removed.files.len(), "removed install");
    Ok(removed)
  }

  /// Mark records with a newer loaded formula version `outdated`, and
  /// outdated records that caught up `installed` again. Broken records are
  /// left alone. Returns the names now outdated.
  pub fn refresh_outdated(&self, store: &FormulaStore) -> Result<Vec<String>, RegistryError> {
    let changes: Vec<(String, InstallStatus)> = self
      .read()
      .values()
      .filter_map(|record| {
        let newest = store.get(&record.name)?;
        let outdated = compare_versions(&newest.version, &record.version).is_gt();
        match (record.status, outdated) {
          (InstallStatus::Installed, true) => Some((record.name.clone(), InstallStatus::Outdated)),
          (InstallStatus::Outdated, false) => Some((record.name.clone(), InstallStatus::Installed)),
          _ => None,
        }
      })
      .collect();

    if !changes.is_empty() {
      self.mutate(|records| {
        for (name, status) in &changes {
          if let Some(record) = records.get_mut(name)
            && record.status != InstallStatus::Broken
          {
            record.status = *status;
          }
        }
        Ok(())
      })?;
    }

    Ok(
      self
        .read()
        .values()
        .filter(|r| r.status == InstallStatus::Outdated)
        .map(|r| r.name.clone())
        .collect(),
    )
  }

  /// Re-read `registry.json`, picking up writes by other processes.
  pub fn reload(&self) -> Result<(), RegistryError> {
    let records = read_file(&self.layout.registry_path())?;
    *self.write() = records;
    Ok(())
  }

  fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, InstallRecord>> {
    self.records.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, InstallRecord>> {
    self.records.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn mutate<T>(
    &self,
    change: impl FnOnce(&mut BTreeMap<String, InstallRecord>) -> Result<T, RegistryError>,
  ) -> Result<T, RegistryError> {
    let _lock = FileLock::acquire(&self.layout.registry_lock_path(), "registry write")?;
    let path = self.layout.registry_path();

    let mut records = read_file(&path)?;
    let result = change(&mut records);
    // Files may already be gone even when the change failed, so persist either way.
    write_file(&path, &records)?;
    *self.write() = records;
    result
  }
}

fn dependents_in(records: &BTreeMap<String, InstallRecord>, name: &str) -> Vec<String> {
  records
    .values()
    .filter(|r| r.name != name && r.dependencies.iter().any(|d| d == name))
    .map(|r| r.name.clone())
    .collect()
}

fn delete_files<'a>(layout: &Layout, files: impl IntoIterator<Item = &'a PathBuf>) -> Result<(), RegistryError> {
  for file in files {
    if !file.starts_with(layout.root()) {
      warn!(path = %file.display(), "refusing to delete file outside the install root");
      continue;
    }
    remove_file_if_exists(file).map_err(|source| RegistryError::RemoveFile {
      path: file.clone(),
      source,
    })?;
    prune_empty_parents(file, layout.root());
  }
  Ok(())
}

fn read_file(path: &Path) -> Result<BTreeMap<String, InstallRecord>, RegistryError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
    Err(source) => {
      return Err(RegistryError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let file: RegistryFile = serde_json::from_str(&content).map_err(|e| RegistryError::Corruption {
    path: path.to_path_buf(),
    message: e.to_string(),
  })?;

  if file.version != REGISTRY_VERSION {
    return Err(RegistryError::Corruption {
      path: path.to_path_buf(),
      message: format!("unsupported registry version {}", file.version),
    });
  }

  for (key, record) in &file.formulas {
    if key != &record.name {
      return Err(RegistryError::Corruption {
        path: path.to_path_buf(),
        message: format!("entry '{key}' holds a record for '{}'", record.name),
      });
    }
  }

  Ok(file.formulas)
}

fn write_file(path: &Path, records: &BTreeMap<String, InstallRecord>) -> Result<(), RegistryError> {
  let dir = path.parent().unwrap_or(Path::new("."));
  let write_err = |source: io::Error| RegistryError::Write {
    path: path.to_path_buf(),
    source,
  };

  fs::create_dir_all(dir).map_err(write_err)?;

  let file = RegistryFile {
    version: REGISTRY_VERSION,
    formulas: records.clone(),
  };
  let content = serde_json::to_vec_pretty(&file).map_err(RegistryError::Serialize)?;

  let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
  temp.write_all(&content).map_err(write_err)?;
  temp.as_file().sync_all().map_err(write_err)?;
  temp.persist(path).map_err(|e| write_err(e.error))?;

  Ok(())
}
