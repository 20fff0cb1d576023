//! keg-lib: Core types and logic for keg
//!
//! This crate provides everything behind the `keg` command:
//! - `Formula`: declarative recipes loaded from TOML or JSON
//! - `Resolver`: dependency-first ordering and parallel build waves
//! - `Installer`: isolated, rolled-back builds of single formulas
//! - `Registry`: the persisted record of what is installed
//! - `Orchestrator`: install, upgrade and uninstall over many formulas

pub mod build;
pub mod config;
pub mod consts;
pub mod formula;
pub mod install;
pub mod placeholder;
pub mod platform;
pub mod registry;
pub mod resolve;
pub mod util;
