//! Implementation of the `keg info` command.

use std::path::PathBuf;

use anyhow::Result;

use keg_lib::install::FormulaInfo;

use crate::output::{format_timestamp, print_info, print_json, print_stat, print_success, truncate_hash};

pub fn cmd_info(name: &str, json: bool, formula_dirs: &[PathBuf]) -> Result<()> {
  let orchestrator = super::open(formula_dirs, None)?;
  let info = orchestrator.info(name)?;

  if json {
    return print_json(&serde_json::json!({
      "name": info.name,
      "versions": info.versions,
      "formula": info.formula,
      "installed": info.record,
      "dependents": info.dependents,
    }));
  }

  print_text(&info);
  Ok(())
}

fn print_text(info: &FormulaInfo) {
  match &info.formula {
    Some(formula) => {
      print_success(&format!("{} {}", formula.name, formula.version));
      if let Some(desc) = &formula.desc {
        print_stat("Description", desc);
      }
      if let Some(homepage) = &formula.homepage {
        print_stat("Homepage", homepage);
      }
      if let Some(license) = &formula.license {
        print_stat("License", license);
      }
      print_stat(
        "Source",
        &format!("{} ({})", formula.source.url, truncate_hash(&formula.source.checksum)),
      );
      if info.versions.len() > 1 {
        print_stat("Versions", &info.versions.join(", "));
      }
      if !formula.dependencies.is_empty() {
        let deps: Vec<String> = formula.dependencies.iter().map(ToString::to_string).collect();
        print_stat("Dependencies", &deps.join(", "));
      }
    }
    None => print_info(&format!("{}: no formula loaded", info.name)),
  }

  println!();
  match &info.record {
    Some(record) => {
      print_stat("Installed", &format!("{} ({})", record.version, record.status));
      print_stat("Installed at", &format_timestamp(record.installed_at));
      print_stat("Files", &record.files.len().to_string());
      if !info.dependents.is_empty() {
        print_stat("Required by", &info.dependents.join(", "));
      }
    }
    None => print_stat("Installed", "no"),
  }
}
