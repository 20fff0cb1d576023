//! Filesystem helpers shared by the executor and the registry.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// List every non-directory entry below `root`, sorted by path.
///
/// Symlinks are listed, never followed.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
  let mut files = Vec::new();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_dir() {
      files.push(entry.into_path());
    }
  }

  Ok(files)
}

/// Remove a file or symlink, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
  match std::fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}

/// Remove now-empty parent directories of `path`, stopping at `stop`.
pub fn prune_empty_parents(path: &Path, stop: &Path) {
  let mut current = path.parent();
  while let Some(dir) = current {
    if dir == stop || !dir.starts_with(stop) {
      break;
    }
    // Fails on non-empty directories, which ends the walk.
    if std::fs::remove_dir(dir).is_err() {
      break;
    }
    current = dir.parent();
  }
}
