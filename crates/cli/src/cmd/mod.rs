mod info;
mod install;
mod list;
mod outdated;
mod uninstall;
mod upgrade;

pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use outdated::cmd_outdated;
pub use uninstall::cmd_uninstall;
pub use upgrade::cmd_upgrade;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use keg_lib::build::{ExecuteConfig, Installer};
use keg_lib::config::Config;
use keg_lib::formula::FormulaStore;
use keg_lib::install::Orchestrator;
use keg_lib::platform::paths::Layout;
use keg_lib::registry::Registry;

/// Load configuration, formulas and the registry.
///
/// `formula_dirs` replaces the configured directories when non-empty and
/// `jobs` overrides the configured parallelism.
pub(crate) fn open(formula_dirs: &[PathBuf], jobs: Option<usize>) -> Result<Orchestrator> {
  let mut config = Config::load_default().context("Failed to load configuration")?;
  if !formula_dirs.is_empty() {
    config.formula_dirs = formula_dirs.to_vec();
  }
  if let Some(jobs) = jobs {
    config.parallelism = jobs.max(1);
  }

  let store = FormulaStore::load_dirs(&config.formula_dirs).context("Failed to load formulas")?;
  let layout = Layout::from_env();
  debug!(
    root = %layout.root().display(),
    formulas = store.len(),
    parallelism = config.parallelism,
    "opening registry"
  );
  let registry = Registry::open(layout).context("Failed to open registry")?;

  let installer = Installer::new(Arc::new(registry), ExecuteConfig::from(&config));
  Ok(Orchestrator::new(store, installer))
}

/// Run `work` to completion on a fresh runtime. Ctrl-C sets the installer's
/// cancel flag so running builds stop at the next step boundary.
pub(crate) fn run_cancellable<F: Future>(orchestrator: &Orchestrator, work: F) -> Result<F::Output> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let cancel = orchestrator.installer().cancel_flag().clone();

  Ok(rt.block_on(async move {
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling after the running steps");
        cancel.cancel();
      }
    });
    work.await
  }))
}

/// Run `work` to completion on a fresh runtime.
pub(crate) fn run<F: Future>(work: F) -> Result<F::Output> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  Ok(rt.block_on(work))
}
