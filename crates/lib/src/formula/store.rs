//! Formula loading and the in-memory formula store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::formula::types::{BuildStep, Dependency, Formula, SourceArtifact};
use crate::formula::version::{VersionConstraint, compare_versions};
use crate::formula::FormulaError;
use crate::placeholder;
use crate::platform::Os;
use crate::util::hash::is_sha256_hex;

/// Text encodings accepted for formula files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
  Toml,
  Json,
}

impl SourceFormat {
  /// Detect the format from a file extension.
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension().and_then(|e| e.to_str()) {
      Some("toml") => Some(Self::Toml),
      Some("json") => Some(Self::Json),
      _ => None,
    }
  }
}

/// Where a formula comes from.
#[derive(Debug, Clone)]
pub enum FormulaSource {
  /// A `.toml` or `.json` file on disk.
  Path(PathBuf),
  /// Formula text held in memory; `label` names it in errors.
  Text {
    label: String,
    format: SourceFormat,
    content: String,
  },
}

impl FormulaSource {
  pub fn toml(label: &str, content: &str) -> Self {
    Self::Text {
      label: label.to_string(),
      format: SourceFormat::Toml,
      content: content.to_string(),
    }
  }

  pub fn json(label: &str, content: &str) -> Self {
    Self::Text {
      label: label.to_string(),
      format: SourceFormat::Json,
      content: content.to_string(),
    }
  }
}

impl fmt::Display for FormulaSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FormulaSource::Path(path) => write!(f, "{}", path.display()),
      FormulaSource::Text { label, .. } => f.write_str(label),
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormula {
  name: Option<String>,
  version: Option<String>,
  desc: Option<String>,
  homepage: Option<String>,
  license: Option<String>,
  #[serde(alias = "url")]
  source_url: Option<String>,
  #[serde(default)]
  mirrors: Vec<String>,
  #[serde(alias = "sha256")]
  checksum: Option<String>,
  #[serde(default)]
  resources: Vec<RawResource>,
  #[serde(default)]
  dependencies: Vec<RawDependency>,
  #[serde(default)]
  env: BTreeMap<String, String>,
  #[serde(default)]
  build_steps: Vec<RawStep>,
  #[serde(default, alias = "post_install_step")]
  post_install: Option<OneOrMany<RawStep>>,
  #[serde(default, alias = "test")]
  test_step: Option<OneOrMany<RawStep>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
  name: Option<String>,
  #[serde(alias = "source_url")]
  url: Option<String>,
  #[serde(default)]
  mirrors: Vec<String>,
  #[serde(alias = "sha256")]
  checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
  Short(String),
  Table(RawDependencyTable),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependencyTable {
  name: String,
  version: Option<String>,
  #[serde(default)]
  platforms: Vec<String>,
  #[serde(default)]
  build: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
  Command(String),
  Table(RawStepTable),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStepTable {
  run: String,
  #[serde(default)]
  env: BTreeMap<String, String>,
  cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  fn into_vec(self) -> Vec<T> {
    match self {
      OneOrMany::One(item) => vec![item],
      OneOrMany::Many(items) => items,
    }
  }
}

/// Load one formula.
///
/// # Errors
///
/// `MalformedFormula` when the text does not parse or a required field
/// (name, version, source_url, checksum) is absent or invalid.
pub fn load(source: &FormulaSource) -> Result<Formula, FormulaError> {
  let origin = source.to_string();

  let (format, content, dir) = match source {
    FormulaSource::Path(path) => {
      let format = SourceFormat::from_path(path).ok_or_else(|| FormulaError::UnsupportedFormat(path.clone()))?;
      let content = std::fs::read_to_string(path).map_err(|source| FormulaError::Read {
        path: path.clone(),
        source,
      })?;
      let dir = path.parent().map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()));
      (format, content, dir)
    }
    FormulaSource::Text { format, content, .. } => (*format, content.clone(), None),
  };

  let raw: RawFormula = match format {
    SourceFormat::Toml => toml::from_str(&content).map_err(|e| malformed(&origin, e.message()))?,
    SourceFormat::Json => serde_json::from_str(&content).map_err(|e| malformed(&origin, e))?,
  };

  let mut formula = validate(raw, &origin)?;
  formula.origin = dir;
  debug!(formula = %formula.name, version = %formula.version, origin = %origin, "loaded formula");
  Ok(formula)
}

fn malformed(origin: &str, message: impl fmt::Display) -> FormulaError {
  FormulaError::MalformedFormula {
    origin: origin.to_string(),
    message: message.to_string(),
  }
}

fn required(value: Option<String>, field: &str, origin: &str) -> Result<String, FormulaError> {
  match value.map(|v| v.trim().to_string()) {
    Some(v) if !v.is_empty() => Ok(v),
    _ => Err(malformed(origin, format!("missing required field '{field}'"))),
  }
}

fn validate_identifier(value: &str, field: &str, origin: &str) -> Result<(), FormulaError> {
  if value == "." || value == ".." || value.contains(['/', '\\']) || value.chars().any(char::is_whitespace) {
    return Err(malformed(origin, format!("invalid {field} '{value}'")));
  }
  Ok(())
}

fn validate_checksum(checksum: String, what: &str, origin: &str) -> Result<String, FormulaError> {
  if !is_sha256_hex(&checksum) {
    return Err(malformed(
      origin,
      format!("checksum of {what} must be a 64-character SHA-256 hex digest"),
    ));
  }
  Ok(checksum.to_ascii_lowercase())
}

fn validate(raw: RawFormula, origin: &str) -> Result<Formula, FormulaError> {
  let name = required(raw.name, "name", origin)?;
  validate_identifier(&name, "name", origin)?;
  let version = required(raw.version, "version", origin)?;
  validate_identifier(&version, "version", origin)?;

  let url = required(raw.source_url, "source_url", origin)?;
  let checksum = validate_checksum(required(raw.checksum, "checksum", origin)?, "source", origin)?;
  let source = SourceArtifact {
    name: None,
    url,
    mirrors: raw.mirrors,
    checksum,
  };

  let mut resources = Vec::with_capacity(raw.resources.len());
  for (idx, resource) in raw.resources.into_iter().enumerate() {
    let label = resource.name.clone().unwrap_or_else(|| format!("resource #{idx}"));
    let url = required(resource.url, &format!("resources[{idx}].url"), origin)?;
    let checksum = validate_checksum(
      required(resource.checksum, &format!("resources[{idx}].checksum"), origin)?,
      &label,
      origin,
    )?;
    resources.push(SourceArtifact {
      name: resource.name,
      url,
      mirrors: resource.mirrors,
      checksum,
    });
  }

  let mut dependencies: Vec<Dependency> = Vec::with_capacity(raw.dependencies.len());
  for dep in raw.dependencies {
    let dep = parse_dependency(dep, origin)?;
    if dependencies.iter().any(|d| d.name == dep.name) {
      return Err(malformed(origin, format!("dependency '{}' declared twice", dep.name)));
    }
    dependencies.push(dep);
  }

  for key in raw.env.keys() {
    validate_env_key(key, origin)?;
  }

  let build_steps = convert_steps(raw.build_steps, origin)?;
  let post_install = convert_steps(raw.post_install.map(OneOrMany::into_vec).unwrap_or_default(), origin)?;
  let test_steps = convert_steps(raw.test_step.map(OneOrMany::into_vec).unwrap_or_default(), origin)?;

  let formula = Formula {
    name,
    version,
    desc: raw.desc,
    homepage: raw.homepage,
    license: raw.license,
    source,
    resources,
    dependencies,
    env: raw.env,
    build_steps,
    post_install,
    test_steps,
    origin: None,
  };

  check_placeholders(&formula, origin)?;
  Ok(formula)
}

fn parse_dependency(raw: RawDependency, origin: &str) -> Result<Dependency, FormulaError> {
  let (name, version, platforms, build_only) = match raw {
    RawDependency::Short(spec) => {
      let spec = spec.trim();
      match spec.split_once(char::is_whitespace) {
        Some((name, constraint)) => (name.to_string(), Some(constraint.trim().to_string()), Vec::new(), false),
        None => (spec.to_string(), None, Vec::new(), false),
      }
    }
    RawDependency::Table(table) => (table.name, table.version, table.platforms, table.build),
  };

  if name.is_empty() {
    return Err(malformed(origin, "dependency with empty name"));
  }
  validate_identifier(&name, "dependency name", origin)?;

  let constraint = version
    .map(|v| {
      VersionConstraint::parse(&v)
        .map_err(|e| malformed(origin, format!("invalid version constraint '{v}' for '{name}': {e}")))
    })
    .transpose()?;

  let platforms = platforms
    .iter()
    .map(|p| p.parse::<Os>().map_err(|e| malformed(origin, format!("dependency '{name}': {e}"))))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(Dependency {
    name,
    constraint,
    platforms,
    build_only,
  })
}

fn validate_env_key(key: &str, origin: &str) -> Result<(), FormulaError> {
  if key.is_empty() || key.contains('=') || key.contains('\0') {
    return Err(malformed(origin, format!("invalid environment variable name '{key}'")));
  }
  Ok(())
}

fn convert_steps(raw: Vec<RawStep>, origin: &str) -> Result<Vec<BuildStep>, FormulaError> {
  raw
    .into_iter()
    .map(|step| {
      let step = match step {
        RawStep::Command(run) => BuildStep::new(run),
        RawStep::Table(table) => BuildStep {
          run: table.run,
          env: table.env,
          cwd: table.cwd,
        },
      };
      if step.run.trim().is_empty() {
        return Err(malformed(origin, "step with empty command"));
      }
      for key in step.env.keys() {
        validate_env_key(key, origin)?;
      }
      Ok(step)
    })
    .collect()
}

/// Every placeholder must parse and `$${dep:NAME}` must name a declared dependency.
fn check_placeholders(formula: &Formula, origin: &str) -> Result<(), FormulaError> {
  let steps = formula
    .build_steps
    .iter()
    .chain(&formula.post_install)
    .chain(&formula.test_steps);

  let mut strings: Vec<&str> = formula.env.values().map(String::as_str).collect();
  for step in steps {
    strings.push(&step.run);
    strings.extend(step.env.values().map(String::as_str));
    strings.extend(step.cwd.as_deref());
  }

  for s in strings {
    let refs = placeholder::dependency_refs(s).map_err(|e| malformed(origin, e))?;
    for name in refs {
      if !formula.dependencies.iter().any(|d| d.name == name) {
        return Err(malformed(
          origin,
          format!("placeholder references undeclared dependency '{name}'"),
        ));
      }
    }
  }

  Ok(())
}

/// Insertion-ordered collection of loaded formulas.
///
/// Several versions of the same name may be loaded; `get` returns the newest.
#[derive(Debug, Clone, Default)]
pub struct FormulaStore {
  formulas: Vec<Formula>,
}

impl FormulaStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a store from already-loaded formulas.
  pub fn from_formulas(formulas: impl IntoIterator<Item = Formula>) -> Result<Self, FormulaError> {
    let mut store = Self::new();
    for formula in formulas {
      store.insert(formula)?;
    }
    Ok(store)
  }

  /// Load every `*.toml`/`*.json` file of each directory, in filename order.
  pub fn load_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, FormulaError> {
    let mut store = Self::new();
    for dir in dirs {
      store.load_dir(dir.as_ref())?;
    }
    Ok(store)
  }

  /// Load every `*.toml`/`*.json` file of `dir`, in filename order.
  pub fn load_dir(&mut self, dir: &Path) -> Result<usize, FormulaError> {
    let entries = std::fs::read_dir(dir).map_err(|source| FormulaError::Read {
      path: dir.to_path_buf(),
      source,
    })?;

    let mut paths: Vec<PathBuf> = entries
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.is_file() && SourceFormat::from_path(path).is_some())
      .collect();
    paths.sort();

    for path in &paths {
      let formula = load(&FormulaSource::Path(path.clone()))?;
      self.insert(formula)?;
    }

    info!(dir = %dir.display(), count = paths.len(), "loaded formula directory");
    Ok(paths.len())
  }

  /// Load one source and add it.
  pub fn load(&mut self, source: &FormulaSource) -> Result<&Formula, FormulaError> {
    let formula = load(source)?;
    self.insert(formula)?;
    Ok(&self.formulas[self.formulas.len() - 1])
  }

  pub fn insert(&mut self, formula: Formula) -> Result<(), FormulaError> {
    if self.formulas.iter().any(|f| f.name == formula.name && f.version == formula.version) {
      return Err(FormulaError::DuplicateFormula {
        name: formula.name,
        version: formula.version,
      });
    }
    self.formulas.push(formula);
    Ok(())
  }

  /// All formulas in insertion order.
  pub fn all(&self) -> &[Formula] {
    &self.formulas
  }

  /// The newest loaded version of `name`.
  pub fn get(&self, name: &str) -> Option<&Formula> {
    self
      .formulas
      .iter()
      .filter(|f| f.name == name)
      .max_by(|a, b| compare_versions(&a.version, &b.version))
  }

  /// All loaded versions of `name`, in insertion order.
  pub fn versions(&self, name: &str) -> Vec<&Formula> {
    self.formulas.iter().filter(|f| f.name == name).collect()
  }

  pub fn len(&self) -> usize {
    self.formulas.len()
  }

  pub fn is_empty(&self) -> bool {
    self.formulas.is_empty()
  }
}
