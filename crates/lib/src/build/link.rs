//! Linking keg executables into `{root}/bin`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Links created for one keg, plus the links of an older keg they replaced.
///
/// Call [`LinkSet::commit`] once the install is recorded; otherwise dropping
/// the set removes the new links and restores the replaced ones.
#[derive(Debug, Default)]
pub struct LinkSet {
  created: Vec<PathBuf>,
  /// Links that already pointed at this keg.
  kept: Vec<PathBuf>,
  /// `(link, previous target)`
  replaced: Vec<(PathBuf, PathBuf)>,
  committed: bool,
}

impl LinkSet {
  /// Every link that now points into the keg, sorted.
  pub fn links(&self) -> Vec<PathBuf> {
    let mut links: Vec<PathBuf> = self.created.iter().chain(&self.kept).cloned().collect();
    links.sort();
    links
  }

  pub fn commit(mut self) {
    self.committed = true;
  }

  fn rollback(&mut self) {
    for link in self.created.drain(..) {
      if let Err(e) = std::fs::remove_file(&link)
        && e.kind() != io::ErrorKind::NotFound
      {
        warn!(link = %link.display(), error = %e, "failed to remove link during rollback");
      }
    }
    for (link, target) in self.replaced.drain(..) {
      if let Err(e) = std::os::unix::fs::symlink(&target, &link) {
        warn!(link = %link.display(), error = %e, "failed to restore link during rollback");
      }
    }
  }
}

impl Drop for LinkSet {
  fn drop(&mut self) {
    if !self.committed {
      self.rollback();
    }
  }
}

/// Symlink every entry of `{keg}/bin` into `bin_dir`.
///
/// An existing link into `owned` (the formula's cellar directory, which
/// holds all of its kegs) is replaced. Anything else already at the target
/// is left alone with a warning.
pub fn link_executables(keg: &Path, owned: &Path, bin_dir: &Path) -> io::Result<LinkSet> {
  let mut set = LinkSet::default();
  let keg_bin = keg.join("bin");
  if !keg_bin.is_dir() {
    return Ok(set);
  }

  std::fs::create_dir_all(bin_dir)?;

  let mut entries: Vec<PathBuf> = std::fs::read_dir(&keg_bin)?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<io::Result<_>>()?;
  entries.sort();

  for source in entries {
    if source.is_dir() {
      continue;
    }
    let Some(file_name) = source.file_name() else {
      continue;
    };
    let link = bin_dir.join(file_name);

    if link.symlink_metadata().is_ok() {
      match std::fs::read_link(&link) {
        Ok(target) if target.starts_with(owned) => {
          if target == source {
            set.kept.push(link);
            continue;
          }
          std::fs::remove_file(&link)?;
          set.replaced.push((link.clone(), target));
        }
        _ => {
          warn!(link = %link.display(), "not linking: file exists and belongs to something else");
          continue;
        }
      }
    }

    std::os::unix::fs::symlink(&source, &link)?;
    debug!(link = %link.display(), target = %source.display(), "linked executable");
    set.created.push(link);
  }

  Ok(set)
}
