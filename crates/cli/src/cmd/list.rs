//! Implementation of the `keg list` command.

use std::path::PathBuf;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use keg_lib::registry::InstallStatus;

use crate::output::{format_age, print_info, print_json, symbols};

pub fn cmd_list(json: bool, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, None)?;
  let records = orchestrator.list()?;

  if json {
    return print_json(&records);
  }

  if records.is_empty() {
    print_info("No formulas installed");
    return Ok(());
  }

  for record in &records {
    let status = match record.status {
      InstallStatus::Installed => String::new(),
      InstallStatus::Outdated => format!(
        " {}",
        "(outdated)".if_supports_color(Stream::Stdout, |s| s.yellow())
      ),
      InstallStatus::Broken => format!(" {}", "(broken)".if_supports_color(Stream::Stdout, |s| s.red())),
    };
    println!(
      "  {} {} {}{} {}",
      symbols::INFO,
      record.name,
      record.version,
      status,
      format_age(record.installed_at).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  Ok(())
}
