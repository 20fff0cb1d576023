//! Source staging: locate, copy, verify and unpack artifacts.
//!
//! Network download is not performed here. `http(s)://` locations are served
//! from the download cache at `{cache}/downloads/<sha256>--<filename>`;
//! local paths and `file://` URLs resolve against the formula's directory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::formula::{Formula, SourceArtifact};
use crate::util::hash::hash_file;

use super::types::BuildError;

/// Archive encodings that are unpacked after staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  Tar,
  TarGz,
}

impl ArchiveKind {
  pub fn from_file_name(name: &str) -> Option<Self> {
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Some(Self::TarGz)
    } else if name.ends_with(".tar") {
      Some(Self::Tar)
    } else {
      None
    }
  }
}

/// File name an `http(s)` location is cached under.
pub fn cache_file_name(artifact: &SourceArtifact, location: &str) -> String {
  let file_name = SourceArtifact {
    url: location.to_string(),
    ..artifact.clone()
  }
  .file_name();
  format!("{}--{}", artifact.checksum, file_name)
}

/// Candidate paths for each location of `artifact`, in order.
pub fn candidate_paths(artifact: &SourceArtifact, origin: Option<&Path>, downloads: &Path) -> Vec<PathBuf> {
  artifact
    .locations()
    .map(|location| {
      if location.starts_with("http://") || location.starts_with("https://") {
        downloads.join(cache_file_name(artifact, location))
      } else {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        match origin {
          Some(origin) if path.is_relative() => origin.join(path),
          _ => path.to_path_buf(),
        }
      }
    })
    .collect()
}

/// Copy the first location of `artifact` whose checksum verifies into
/// `dest_dir`. Returns the staged file.
///
/// A location with the wrong contents is skipped in favour of the next one;
/// the mismatch is reported only when no location verifies.
pub async fn stage_artifact(
  formula: &Formula,
  artifact: &SourceArtifact,
  downloads: &Path,
  dest_dir: &Path,
) -> Result<PathBuf, BuildError> {
  let candidates = candidate_paths(artifact, formula.origin(), downloads);
  let dest = dest_dir.join(artifact.file_name());
  let mut mismatch = None;

  for found in candidates.iter().filter(|p| p.is_file()) {
    debug!(formula = %formula.name, from = %found.display(), to = %dest.display(), "staging artifact");
    tokio::fs::copy(found, &dest)
      .await
      .map_err(BuildError::io(&formula.name, found))?;

    let hash_path = dest.clone();
    let actual = tokio::task::spawn_blocking(move || hash_file(&hash_path))
      .await
      .map_err(|e| io::Error::other(e.to_string()))
      .and_then(|r| r)
      .map_err(BuildError::io(&formula.name, &dest))?;

    if actual.matches(&artifact.checksum) {
      info!(formula = %formula.name, artifact = %artifact.file_name(), "staged artifact");
      return Ok(dest);
    }

    warn!(
      formula = %formula.name,
      artifact = %artifact.file_name(),
      location = %found.display(),
      "checksum mismatch"
    );
    mismatch = Some(actual.0);
  }

  match mismatch {
    Some(actual) => {
      tokio::fs::remove_file(&dest)
        .await
        .map_err(BuildError::io(&formula.name, &dest))?;
      Err(BuildError::ChecksumMismatch {
        formula: formula.name.clone(),
        artifact: artifact.file_name(),
        expected: artifact.checksum.clone(),
        actual,
      })
    }
    None => Err(BuildError::SourceUnavailable {
      formula: formula.name.clone(),
      artifact: artifact.name.clone().unwrap_or_else(|| artifact.url.clone()),
      tried: candidates.iter().map(|p| p.display().to_string()).collect(),
    }),
  }
}

/// Unpack `archive` into `dest`, removing the archive afterwards.
///
/// Returns the directory steps should run in: the single top-level
/// directory if the archive has one, `dest` otherwise.
pub async fn unpack(formula: &str, archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<PathBuf, BuildError> {
  let archive_path = archive.to_path_buf();
  let dest_path = dest.to_path_buf();

  let result = tokio::task::spawn_blocking(move || -> io::Result<PathBuf> {
    let scratch = tempfile::Builder::new().prefix(".unpack").tempdir_in(&dest_path)?;
    let file = File::open(&archive_path)?;
    match kind {
      ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(file)).unpack(scratch.path())?,
      ArchiveKind::Tar => tar::Archive::new(file).unpack(scratch.path())?,
    }
    std::fs::remove_file(&archive_path)?;

    let entries: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
      .map(|entry| entry.map(|e| e.path()))
      .collect::<io::Result<_>>()?;

    let mut moved = Vec::with_capacity(entries.len());
    for entry in &entries {
      if let Some(name) = entry.file_name() {
        let target = dest_path.join(name);
        std::fs::rename(entry, &target)?;
        moved.push(target);
      }
    }

    if let [only] = moved.as_slice()
      && only.is_dir()
    {
      return Ok(only.clone());
    }
    Ok(dest_path)
  })
  .await
  .map_err(|e| io::Error::other(e.to_string()))
  .and_then(|r| r);

  result.map_err(|source| BuildError::Unpack {
    formula: formula.to_string(),
    path: archive.to_path_buf(),
    source,
  })
}
