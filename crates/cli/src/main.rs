mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{cmd_info, cmd_install, cmd_list, cmd_outdated, cmd_uninstall, cmd_upgrade};
use output::print_error;

/// keg - Build and install packages from declarative formulas
#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Formula directory (repeatable; replaces configured directories)
  #[arg(long = "formulas", value_name = "DIR", global = true)]
  formulas: Vec<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Install formulas and their dependencies
  Install {
    #[arg(required = true)]
    names: Vec<String>,

    /// Rebuild even if the same version is installed
    #[arg(short, long)]
    force: bool,

    /// Maximum number of formulas built at the same time
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
  },

  /// Remove installed formulas
  Uninstall {
    #[arg(required = true)]
    names: Vec<String>,

    /// Remove even if other installed formulas depend on them
    #[arg(long)]
    ignore_dependencies: bool,
  },

  /// List installed formulas
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show a formula and its installation
  Info {
    name: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// List installed formulas with a newer version available
  Outdated {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Upgrade outdated formulas (all of them if none are named)
  Upgrade {
    names: Vec<String>,

    /// Maximum number of formulas built at the same time
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_env("KEG_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Install { names, force, jobs } => cmd_install(&names, force, jobs, &cli.formulas),
    Commands::Uninstall {
      names,
      ignore_dependencies,
    } => cmd_uninstall(&names, ignore_dependencies, &cli.formulas),
    Commands::List { json } => cmd_list(json, &cli.formulas),
    Commands::Info { name, json } => cmd_info(&name, json, &cli.formulas),
    Commands::Outdated { json } => cmd_outdated(json, &cli.formulas),
    Commands::Upgrade { names, jobs } => cmd_upgrade(&names, jobs, &cli.formulas),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
