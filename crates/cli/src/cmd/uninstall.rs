//! Implementation of the `keg uninstall` command.

use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::output::{print_error, print_success};

/// Execute the uninstall command.
///
/// Removes each named formula, its keg and its links. Formulas that others
/// depend on are refused unless `ignore_dependencies` is set.
pub fn cmd_uninstall(names: &[String], ignore_dependencies: bool, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, None)?;

  let report = super::run(orchestrator.uninstall(names, ignore_dependencies))??;

  for record in &report.removed {
    print_success(&format!(
      "Uninstalled {} {} ({} files)",
      record.name,
      record.version,
      record.files.len()
    ));
  }
  for (_, err) in &report.failed {
    print_error(&err.to_string());
  }

  if !report.is_success() {
    bail!("{} formula(s) could not be uninstalled", report.failed.len());
  }
  Ok(())
}
