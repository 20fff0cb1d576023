//! Lenient version parsing and constraint matching.
//!
//! Formula versions are usually semver-shaped ("11.3.0", "0.7.2") but
//! upstreams also ship "1.2", "2023.01" or "1.0.2u". Short numeric versions
//! are zero-padded to three components; anything that still does not parse
//! only satisfies an exact `=version` constraint.

use std::cmp::Ordering;
use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

/// Parse a version, zero-padding `MAJOR` and `MAJOR.MINOR` forms.
pub fn parse_version(s: &str) -> Option<Version> {
  let s = s.trim().trim_start_matches('v');
  if let Ok(v) = Version::parse(s) {
    return Some(v);
  }

  let (core, rest) = match s.find(['-', '+']) {
    Some(idx) => s.split_at(idx),
    None => (s, ""),
  };

  let parts: Vec<&str> = core.split('.').collect();
  if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
    return None;
  }

  // Strip leading zeros ("2023.01" -> "2023.1") which strict semver refuses.
  let mut numbers: Vec<String> = parts
    .iter()
    .map(|p| p.trim_start_matches('0'))
    .map(|p| if p.is_empty() { "0".to_string() } else { p.to_string() })
    .collect();
  while numbers.len() < 3 {
    numbers.push("0".to_string());
  }

  Version::parse(&format!("{}{}", numbers.join("."), rest)).ok()
}

/// The leading numeric component of a version ("11.3.0" -> "11").
pub fn major_component(version: &str) -> &str {
  let end = version.find(|c: char| !c.is_ascii_digit()).unwrap_or(version.len());
  if end == 0 { version } else { &version[..end] }
}

/// Order two version strings: parseable versions by semver precedence and
/// above unparseable ones, which fall back to string order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
  match (parse_version(a), parse_version(b)) {
    (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
    (Some(_), None) => Ordering::Greater,
    (None, Some(_)) => Ordering::Less,
    (None, None) => a.cmp(b),
  }
}

/// A version requirement attached to a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
  raw: String,
  /// `None` for `=version` pins whose version is not semver-shaped.
  req: Option<VersionReq>,
}

impl VersionConstraint {
  pub fn parse(s: &str) -> Result<Self, semver::Error> {
    let raw = s.trim().to_string();
    let req = match VersionReq::parse(&raw) {
      Ok(req) => Some(req),
      Err(_) if raw.starts_with('=') && raw.len() > 1 => None,
      Err(e) => return Err(e),
    };
    Ok(Self { raw, req })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Whether `version` satisfies this constraint.
  pub fn matches(&self, version: &str) -> bool {
    if let Some(exact) = self.raw.strip_prefix('=')
      && exact.trim() == version
    {
      return true;
    }

    match (&self.req, parse_version(version)) {
      (Some(req), Some(v)) => req.matches(&v),
      _ => false,
    }
  }
}

impl fmt::Display for VersionConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

impl TryFrom<String> for VersionConstraint {
  type Error = semver::Error;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<VersionConstraint> for String {
  fn from(c: VersionConstraint) -> Self {
    c.raw
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_versions_are_padded() {
    assert_eq!(parse_version("1.2"), Some(Version::new(1, 2, 0)));
    assert_eq!(parse_version("11"), Some(Version::new(11, 0, 0)));
    assert_eq!(parse_version("2023.01"), Some(Version::new(2023, 1, 0)));
    assert_eq!(parse_version("v2.1.10"), Some(Version::new(2, 1, 10)));
  }

  #[test]
  fn non_numeric_versions_do_not_parse() {
    assert_eq!(parse_version("1.0.2u"), None);
    assert_eq!(parse_version("HEAD"), None);
    assert_eq!(parse_version("1.2.3.4"), None);
  }

  #[test]
  fn major_component_of_versions() {
    assert_eq!(major_component("11.3.0"), "11");
    assert_eq!(major_component("0.7.2"), "0");
    assert_eq!(major_component("HEAD"), "HEAD");
  }

  #[test]
  fn compare_uses_semver_precedence() {
    assert_eq!(compare_versions("11.10.0", "11.9.0"), Ordering::Greater);
    assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
    assert_eq!(compare_versions("1.0.2u", "0.1.0"), Ordering::Less);
  }

  #[test]
  fn constraint_matches_padded_versions() {
    let c = VersionConstraint::parse(">=4").unwrap();
    assert!(c.matches("4.1.0"));
    assert!(c.matches("4.1"));
    assert!(!c.matches("3.1.6"));
  }

  #[test]
  fn exact_constraint_matches_unparseable_version() {
    let c = VersionConstraint::parse("=1.0.2u").unwrap();
    assert!(c.matches("1.0.2u"));
    assert!(!c.matches("1.0.2"));
  }

  #[test]
  fn invalid_constraint_fails_to_parse() {
    assert!(VersionConstraint::parse(">= banana").is_err());
  }
}
