//! Exclusive file locks serializing work on one formula name or on the
//! registry file itself.
//!
//! Locks are `flock(2)` locks on files under `{root}/locks`. Every
//! acquisition opens its own file description, so two tasks in one process
//! contend exactly like two processes do.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::registry::types::now_unix;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub pid: u32,
  pub started_at_unix: u64,
  pub purpose: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to create lock directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file {path}: {source}")]
  OpenFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to acquire lock {path}: {source}")]
  LockFailed {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("lock task panicked or was cancelled")]
  Join,
}

/// A held exclusive lock; released when dropped.
#[derive(Debug)]
pub struct FileLock {
  file: File,
  path: PathBuf,
}

impl FileLock {
  /// Block until the lock at `path` is held.
  ///
  /// If another holder is found, its metadata is logged before waiting.
  pub fn acquire(path: &Path, purpose: &str) -> Result<Self, LockError> {
    let file = open_lock_file(path)?;

    match lock(&file, false) {
      Ok(()) => {}
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
        match read_metadata_at(path) {
          Some(holder) => info!(
            lock = %path.display(),
            pid = holder.pid,
            holder = %holder.purpose,
            "waiting for lock"
          ),
          None => info!(lock = %path.display(), "waiting for lock"),
        }
        lock(&file, true).map_err(|source| LockError::LockFailed {
          path: path.to_path_buf(),
          source,
        })?;
      }
      Err(source) => {
        return Err(LockError::LockFailed {
          path: path.to_path_buf(),
          source,
        });
      }
    }

    let held = FileLock {
      file,
      path: path.to_path_buf(),
    };
    held.write_metadata(purpose)?;
    debug!(lock = %path.display(), purpose, "lock acquired");
    Ok(held)
  }

  /// Take the lock without waiting; `None` if someone else holds it.
  #[cfg(test)]
  fn try_acquire(path: &Path, purpose: &str) -> Result<Option<Self>, LockError> {
    let file = open_lock_file(path)?;

    match lock(&file, false) {
      Ok(()) => {
        let held = FileLock {
          file,
          path: path.to_path_buf(),
        };
        held.write_metadata(purpose)?;
        Ok(Some(held))
      }
      Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
      Err(source) => Err(LockError::LockFailed {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  /// Acquire on the blocking pool so waiting never stalls the async runtime.
  pub async fn acquire_async(path: PathBuf, purpose: String) -> Result<Self, LockError> {
    tokio::task::spawn_blocking(move || Self::acquire(&path, &purpose))
      .await
      .map_err(|_| LockError::Join)?
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Reads the metadata through the held handle.
  #[cfg(test)]
  fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::Read;

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  fn write_metadata(&self, purpose: &str) -> Result<(), LockError> {
    let metadata = LockMetadata {
      pid: std::process::id(),
      started_at_unix: now_unix(),
      purpose: purpose.to_string(),
    };

    let write = || -> io::Result<()> {
      self.file.set_len(0)?;
      let mut file = &self.file;
      file.seek(SeekFrom::Start(0))?;
      let mut writer = io::BufWriter::new(file);
      serde_json::to_writer(&mut writer, &metadata).map_err(io::Error::other)?;
      writer.flush()
    };

    write().map_err(|source| LockError::LockFailed {
      path: self.path.clone(),
      source,
    })
  }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
  if let Some(parent) = path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(path)
    .map_err(|source| LockError::OpenFile {
      path: path.to_path_buf(),
      source,
    })
}

fn read_metadata_at(path: &Path) -> Option<LockMetadata> {
  let contents = std::fs::read_to_string(path).ok()?;
  serde_json::from_str(&contents).ok()
}

fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if blocking {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}
