//! Per-formula build context.
//!
//! A `BuildContext` owns a scoped working directory under `{root}/tmp` and
//! the environment overlay handed to every step. Dropping it removes the
//! directory, whether the build succeeded or not.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::consts::SOURCE_DATE_EPOCH;
use crate::formula::{BuildStep, Formula};
use crate::placeholder::{self, Placeholder, PlaceholderError, Resolver};
use crate::platform::paths::Layout;

/// Keg directory of one installed dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyKeg {
  pub name: String,
  pub keg: PathBuf,
}

#[derive(Debug)]
pub struct BuildContext {
  dir: TempDir,
  src: PathBuf,
  name: String,
  version: String,
  version_major: String,
  keg: PathBuf,
  root: PathBuf,
  /// Direct dependencies first, then transitive ones.
  deps: Vec<DependencyKeg>,
  base_path: String,
}

impl BuildContext {
  /// Create the scoped directory `{root}/tmp/<name>-<version>.XXXXXX`.
  pub fn new(layout: &Layout, formula: &Formula, deps: Vec<DependencyKeg>, base_path: &str) -> io::Result<Self> {
    std::fs::create_dir_all(layout.tmp_dir())?;
    let dir = tempfile::Builder::new()
      .prefix(&format!("{}-{}.", formula.name, formula.version))
      .tempdir_in(layout.tmp_dir())?;

    let src = dir.path().join("src");
    for sub in ["src", "home", "tmp"] {
      std::fs::create_dir_all(dir.path().join(sub))?;
    }

    Ok(Self {
      dir,
      src,
      name: formula.name.clone(),
      version: formula.version.clone(),
      version_major: formula.version_major().to_string(),
      keg: layout.keg_path(&formula.name, &formula.version),
      root: layout.root().to_path_buf(),
      deps,
      base_path: base_path.to_string(),
    })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Where artifacts are unpacked.
  pub fn staging_dir(&self) -> PathBuf {
    self.dir.path().join("src")
  }

  /// Directory steps run in by default.
  pub fn src(&self) -> &Path {
    &self.src
  }

  pub(crate) fn set_src(&mut self, src: PathBuf) {
    self.src = src;
  }

  /// Variables every step starts from.
  pub fn base_env(&self) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    let tmp = self.dir.path().join("tmp").display().to_string();

    let mut path: Vec<String> = self.dep_dirs("bin");
    path.push(self.base_path.clone());
    env.insert("PATH".to_string(), path.join(":"));

    env.insert("HOME".to_string(), self.dir.path().join("home").display().to_string());
    for key in ["TMPDIR", "TMP", "TEMP"] {
      env.insert(key.to_string(), tmp.clone());
    }

    let keg = self.keg.display().to_string();
    env.insert("prefix".to_string(), keg.clone());
    env.insert("KEG_PREFIX".to_string(), keg);
    env.insert("KEG_NAME".to_string(), self.name.clone());
    env.insert("KEG_VERSION".to_string(), self.version.clone());

    let search_paths = [
      ("CPATH", self.dep_dirs("include")),
      ("LIBRARY_PATH", self.dep_dirs("lib")),
      (
        "PKG_CONFIG_PATH",
        self
          .dep_dirs("lib/pkgconfig")
          .into_iter()
          .chain(self.dep_dirs("share/pkgconfig"))
          .collect(),
      ),
    ];
    for (key, dirs) in search_paths {
      if !dirs.is_empty() {
        env.insert(key.to_string(), dirs.join(":"));
      }
    }

    env.insert("LANG".to_string(), "C".to_string());
    env.insert("LC_ALL".to_string(), "C".to_string());
    env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    env
  }

  /// Full environment for one step: base, then formula env, then step env.
  pub fn step_env(
    &self,
    formula_env: &BTreeMap<String, String>,
    step: &BuildStep,
  ) -> Result<BTreeMap<String, String>, PlaceholderError> {
    let mut env = self.base_env();
    for (key, value) in formula_env.iter().chain(&step.env) {
      env.insert(key.clone(), placeholder::substitute(value, self)?);
    }
    Ok(env)
  }

  /// Working directory for `step`: its `cwd` relative to `src`, or `src`.
  pub fn step_dir(&self, step: &BuildStep) -> Result<PathBuf, PlaceholderError> {
    match &step.cwd {
      Some(cwd) => Ok(self.src.join(placeholder::substitute(cwd, self)?)),
      None => Ok(self.src.clone()),
    }
  }

  fn dep_dirs(&self, sub: &str) -> Vec<String> {
    self
      .deps
      .iter()
      .map(|d| d.keg.join(sub).display().to_string())
      .collect()
  }
}

impl Resolver for BuildContext {
  fn resolve(&self, placeholder: &Placeholder) -> Result<String, PlaceholderError> {
    let value = match placeholder {
      Placeholder::Prefix => self.keg.display().to_string(),
      Placeholder::Bin => self.keg.join("bin").display().to_string(),
      Placeholder::Lib => self.keg.join("lib").display().to_string(),
      Placeholder::Include => self.keg.join("include").display().to_string(),
      Placeholder::Share => self.keg.join("share").display().to_string(),
      Placeholder::Name => self.name.clone(),
      Placeholder::Version => self.version.clone(),
      Placeholder::VersionMajor => self.version_major.clone(),
      Placeholder::Src => self.src.display().to_string(),
      Placeholder::Root => self.root.display().to_string(),
      Placeholder::Dep(name) => self
        .deps
        .iter()
        .find(|d| &d.name == name)
        .map(|d| d.keg.display().to_string())
        .ok_or_else(|| PlaceholderError::UnresolvedDependency(name.clone()))?,
    };
    Ok(value)
  }
}
