//! Formula build execution.
//!
//! Installing a formula runs in a scoped context under `{root}/tmp`:
//!
//! 1. Every artifact is located, copied in and checked against its checksum
//! 2. An archive source is unpacked and becomes the step working directory
//! 3. Build steps run in order with a cleared, fully specified environment
//! 4. Executables in `{keg}/bin` are linked into `{root}/bin`
//! 5. Post-install and test steps run
//! 6. The keg's files are recorded in the registry
//!
//! A failure before step 6 removes the keg, the links and the context.
//!
//! # Submodules
//!
//! - [`context`] - Scoped directory, environment overlay and placeholders
//! - [`installer`] - Per-formula install and uninstall
//! - [`stage`] - Artifact staging and unpacking

pub mod context;
pub mod installer;
mod link;
pub mod stage;
mod step;
mod types;

pub use context::{BuildContext, DependencyKeg};
pub use installer::{InstallOutcome, Installer};
pub use link::{LinkSet, link_executables};
pub use step::{StepOutput, execute_step};
pub use types::*;
