//! Implementation of the `keg install` command.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, bail};

use keg_lib::install::InstallReport;

use crate::output::{format_duration, print_error, print_info, print_success, print_warning, symbols};

/// Execute the install command.
///
/// Resolves the named formulas with their dependencies, builds whatever is
/// not installed yet and prints one line per formula. Fails if any formula
/// failed or was skipped.
pub fn cmd_install(names: &[String], force: bool, jobs: Option<usize>, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, jobs)?;
  let started = Instant::now();

  let report = super::run_cancellable(&orchestrator, orchestrator.install(names, force))??;

  print_report(&report);
  finish(&report, started)
}

/// One line per formula in the report: successes, then failures and skips.
pub(crate) fn print_report(report: &InstallReport) {
  for record in &report.installed {
    print_success(&format!("Installed {} {}", record.name, record.version));
  }
  for (record, previous) in &report.upgraded {
    print_success(&format!(
      "Upgraded {} {} {} {}",
      record.name,
      previous,
      symbols::ARROW,
      record.version
    ));
  }
  for record in &report.unchanged {
    print_info(&format!("{} {} is already installed", record.name, record.version));
  }
  for record in &report.broken {
    print_warning(&format!(
      "{} {} is installed but broken; reinstall with --force",
      record.name, record.version
    ));
  }
  for (_, err) in &report.failed {
    print_error(&err.to_string());
  }
  for (name, dependency) in &report.skipped {
    print_warning(&format!("Skipped {name}: dependency {dependency} failed"));
  }
}

pub(crate) fn finish(report: &InstallReport, started: Instant) -> Result<()> {
  if !report.is_success() {
    bail!(
      "{} formula(s) failed, {} broken, {} skipped",
      report.failed.len(),
      report.broken.len(),
      report.skipped.len()
    );
  }

  let built = report.installed.len() + report.upgraded.len();
  if built > 0 {
    print_info(&format!(
      "Built {} formula(s) in {}",
      built,
      format_duration(started.elapsed())
    ));
  }
  Ok(())
}
