use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::formula::version::{VersionConstraint, major_component};
use crate::platform::Os;

/// An immutable build recipe for one version of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Formula {
  pub name: String,
  pub version: String,
  pub desc: Option<String>,
  pub homepage: Option<String>,
  pub license: Option<String>,
  /// Primary source artifact.
  pub source: SourceArtifact,
  /// Additional artifacts (patches, vendored resources), staged after the source.
  pub resources: Vec<SourceArtifact>,
  pub dependencies: Vec<Dependency>,
  /// Environment overlay applied to every step of this formula.
  pub env: BTreeMap<String, String>,
  pub build_steps: Vec<BuildStep>,
  pub post_install: Vec<BuildStep>,
  pub test_steps: Vec<BuildStep>,
  /// Directory the formula file was loaded from; relative source paths resolve here.
  #[serde(skip)]
  pub origin: Option<PathBuf>,
}

impl Formula {
  /// All artifacts in staging order: the primary source, then resources.
  pub fn artifacts(&self) -> impl Iterator<Item = &SourceArtifact> {
    std::iter::once(&self.source).chain(self.resources.iter())
  }

  /// Dependencies that apply on `os` (all of them when `os` is unknown).
  pub fn dependencies_for(&self, os: Option<Os>) -> impl Iterator<Item = &Dependency> {
    self.dependencies.iter().filter(move |dep| dep.applies_to(os))
  }

  pub fn version_major(&self) -> &str {
    major_component(&self.version)
  }

  pub fn origin(&self) -> Option<&Path> {
    self.origin.as_deref()
  }
}

impl fmt::Display for Formula {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.name, self.version)
  }
}

/// A downloadable (or local) file together with its expected SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceArtifact {
  /// Resource name; `None` for the primary source.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub url: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub mirrors: Vec<String>,
  pub checksum: String,
}

impl SourceArtifact {
  /// Locations to try, in order: the URL, then mirrors.
  pub fn locations(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.url.as_str()).chain(self.mirrors.iter().map(String::as_str))
  }

  /// File name derived from the URL's last path segment.
  pub fn file_name(&self) -> String {
    let without_query = self.url.split(['?', '#']).next().unwrap_or(&self.url);
    let last = without_query.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    if last.is_empty() {
      self.name.clone().unwrap_or_else(|| "source".to_string())
    } else {
      last.to_string()
    }
  }
}

/// A declared dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub constraint: Option<VersionConstraint>,
  /// Restrict the edge to these operating systems; empty means everywhere.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub platforms: Vec<Os>,
  /// Needed only while building (Homebrew's `=> :build`).
  pub build_only: bool,
}

impl Dependency {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      constraint: None,
      platforms: Vec::new(),
      build_only: false,
    }
  }

  pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
    self.constraint = Some(constraint);
    self
  }

  pub fn applies_to(&self, os: Option<Os>) -> bool {
    match os {
      Some(os) => self.platforms.is_empty() || self.platforms.contains(&os),
      None => true,
    }
  }
}

impl fmt::Display for Dependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.constraint {
      Some(c) => write!(f, "{} {}", self.name, c),
      None => f.write_str(&self.name),
    }
  }
}

/// One opaque shell command plus its overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
  pub run: String,
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cwd: Option<String>,
}

impl BuildStep {
  pub fn new(run: impl Into<String>) -> Self {
    Self {
      run: run.into(),
      env: BTreeMap::new(),
      cwd: None,
    }
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_cwd(mut self, cwd: &str) -> Self {
    self.cwd = Some(cwd.to_string());
    self
  }
}

impl From<&str> for BuildStep {
  fn from(run: &str) -> Self {
    BuildStep::new(run)
  }
}

/// Which list a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
  Fetch,
  Build,
  PostInstall,
  Test,
}

impl fmt::Display for StepPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      StepPhase::Fetch => "fetch",
      StepPhase::Build => "build",
      StepPhase::PostInstall => "post_install",
      StepPhase::Test => "test",
    })
  }
}

/// Identifies one step for error reporting, e.g. `build[2]: make install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepId {
  pub phase: StepPhase,
  pub index: usize,
  pub command: String,
}

impl StepId {
  pub fn new(phase: StepPhase, index: usize, command: impl Into<String>) -> Self {
    Self {
      phase,
      index,
      command: command.into(),
    }
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let first_line = self.command.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    write!(f, "{}[{}]: {}", self.phase, self.index, first_line)
  }
}
