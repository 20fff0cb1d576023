//! Implementation of the `keg upgrade` command.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;

use crate::output::print_info;

use super::install::{finish, print_report};

/// Execute the upgrade command.
///
/// Upgrades the named formulas, or every outdated one when none are named.
pub fn cmd_upgrade(names: &[String], jobs: Option<usize>, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, jobs)?;
  let started = Instant::now();

  let report = super::run_cancellable(&orchestrator, orchestrator.upgrade(names))??;

  if report.total() == 0 {
    print_info("All formulas are up to date");
    return Ok(());
  }

  print_report(&report);
  finish(&report, started)
}
