//! Installation records, statuses and the per-formula lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::consts::REGISTRY_VERSION;

/// Persisted status of an installed formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
  Installed,
  /// Built and linked, but its test step failed.
  Broken,
  /// A newer version of the formula is loaded.
  Outdated,
}

impl fmt::Display for InstallStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      InstallStatus::Installed => "installed",
      InstallStatus::Broken => "broken",
      InstallStatus::Outdated => "outdated",
    })
  }
}

/// What the registry knows about one installed formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
  pub name: String,
  pub version: String,
  /// Absolute paths of every installed file: keg contents and linked executables.
  pub files: Vec<PathBuf>,
  /// Names of the formulas this one was built against.
  pub dependencies: Vec<String>,
  /// Unix seconds.
  pub installed_at: u64,
  pub status: InstallStatus,
}

impl InstallRecord {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      files: Vec::new(),
      dependencies: Vec::new(),
      installed_at: now_unix(),
      status: InstallStatus::Installed,
    }
  }

  /// Whether dependents may build against this install.
  ///
  /// Outdated installs still count; broken ones do not.
  pub fn is_usable(&self) -> bool {
    matches!(self.status, InstallStatus::Installed | InstallStatus::Outdated)
  }

  pub fn lifecycle(&self) -> Lifecycle {
    match self.status {
      InstallStatus::Broken => Lifecycle::Broken,
      InstallStatus::Installed | InstallStatus::Outdated => Lifecycle::Installed,
    }
  }
}

pub(crate) fn now_unix() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default()
}

/// On-disk layout of `registry.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFile {
  pub version: u32,
  #[serde(default)]
  pub formulas: BTreeMap<String, InstallRecord>,
}

impl Default for RegistryFile {
  fn default() -> Self {
    Self {
      version: REGISTRY_VERSION,
      formulas: BTreeMap::new(),
    }
  }
}

/// Lifecycle of one formula name.
///
/// ```text
/// absent -> building -> installed -> upgrading -> installed
///                                 -> uninstalling -> absent
/// ```
///
/// A failed build returns to `absent`, a failed upgrade to `installed`. A
/// successful build or upgrade whose test step fails ends in `broken`, which
/// can be uninstalled or rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
  Absent,
  Building,
  Installed,
  Upgrading,
  Uninstalling,
  Broken,
}

impl Lifecycle {
  pub fn can_transition_to(self, next: Lifecycle) -> bool {
    use Lifecycle::*;

    matches!(
      (self, next),
      (Absent, Building)
        | (Building, Installed | Broken | Absent)
        | (Installed, Upgrading | Uninstalling)
        | (Upgrading, Installed | Broken)
        | (Uninstalling, Absent | Installed | Broken)
        | (Broken, Building | Upgrading | Uninstalling)
    )
  }
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Lifecycle::Absent => "absent",
      Lifecycle::Building => "building",
      Lifecycle::Installed => "installed",
      Lifecycle::Upgrading => "upgrading",
      Lifecycle::Uninstalling => "uninstalling",
      Lifecycle::Broken => "broken",
    })
  }
}
