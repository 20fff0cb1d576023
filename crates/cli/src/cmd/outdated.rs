//! Implementation of the `keg outdated` command.

use std::path::PathBuf;

use anyhow::Result;

use crate::output::{print_info, print_json, symbols};

pub fn cmd_outdated(json: bool, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, None)?;
  let outdated = orchestrator.outdated()?;

  if json {
    return print_json(&outdated);
  }

  if outdated.is_empty() {
    print_info("All formulas are up to date");
    return Ok(());
  }

  for entry in &outdated {
    println!(
      "  {} {} {} {} {}",
      symbols::INFO,
      entry.name,
      entry.installed,
      symbols::ARROW,
      entry.latest
    );
  }

  Ok(())
}
