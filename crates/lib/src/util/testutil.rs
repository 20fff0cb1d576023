//! Test utilities for keg-lib.
//!
//! Builders for in-memory formulas and helpers that write real source
//! artifacts (plain files and gzipped tarballs) with matching checksums.

use std::collections::BTreeMap;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::formula::{BuildStep, Dependency, Formula, SourceArtifact, VersionConstraint};
use crate::util::hash::hash_bytes;

/// A syntactically valid checksum for formulas whose source is never staged.
pub const DUMMY_CHECKSUM: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A formula with no steps whose dependencies are given as `"name"` or `"name >=1"`.
pub fn formula(name: &str, version: &str, deps: &[&str]) -> Formula {
  Formula {
    name: name.to_string(),
    version: version.to_string(),
    desc: None,
    homepage: None,
    license: None,
    source: SourceArtifact {
      name: None,
      url: format!("{name}-{version}.tar.gz"),
      mirrors: Vec::new(),
      checksum: DUMMY_CHECKSUM.to_string(),
    },
    resources: Vec::new(),
    dependencies: deps.iter().map(|d| dependency(d)).collect(),
    env: BTreeMap::new(),
    build_steps: Vec::new(),
    post_install: Vec::new(),
    test_steps: Vec::new(),
    origin: None,
  }
}

fn dependency(spec: &str) -> Dependency {
  match spec.split_once(' ') {
    Some((name, constraint)) => {
      Dependency::new(name).with_constraint(VersionConstraint::parse(constraint).expect("valid constraint"))
    }
    None => Dependency::new(spec),
  }
}

pub fn steps(commands: &[&str]) -> Vec<BuildStep> {
  commands.iter().map(|c| BuildStep::from(*c)).collect()
}

/// Write `contents` to `dir/file_name` and describe it as a local artifact.
pub fn local_source(dir: &Path, file_name: &str, contents: &[u8]) -> SourceArtifact {
  std::fs::create_dir_all(dir).unwrap();
  std::fs::write(dir.join(file_name), contents).unwrap();
  SourceArtifact {
    name: None,
    url: file_name.to_string(),
    mirrors: Vec::new(),
    checksum: hash_bytes(contents).0,
  }
}

/// Build an in-memory `.tar.gz` whose entries live under `root` (or at the
/// top level when `root` is empty).
pub fn tarball_bytes(root: &str, files: &[(&str, &str)]) -> Vec<u8> {
  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = tar::Builder::new(encoder);

  for (path, contents) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_cksum();
    let entry = if root.is_empty() {
      path.to_string()
    } else {
      format!("{root}/{path}")
    };
    builder.append_data(&mut header, entry, contents.as_bytes()).unwrap();
  }

  builder.into_inner().unwrap().finish().unwrap()
}

/// Write a tarball into `dir` and return a formula-ready artifact for it.
pub fn tarball_source(dir: &Path, file_name: &str, root: &str, files: &[(&str, &str)]) -> SourceArtifact {
  local_source(dir, file_name, &tarball_bytes(root, files))
}
