use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating systems a dependency can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Os {
  Linux,
  MacOs,
}

impl Os {
  /// Detect the current operating system at runtime.
  ///
  /// Returns `None` on hosts that formulas cannot target.
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      _ => None,
    }
  }

  /// Returns the lowercase identifier used in formula files.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Os {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "linux" => Ok(Self::Linux),
      "macos" | "darwin" | "mac" => Ok(Self::MacOs),
      other => Err(format!("unknown platform '{other}' (expected linux or macos)")),
    }
  }
}

impl TryFrom<String> for Os {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Os> for String {
  fn from(os: Os) -> Self {
    os.as_str().to_string()
  }
}
