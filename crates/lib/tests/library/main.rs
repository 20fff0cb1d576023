mod common;
mod install_tests;
mod registry_tests;
mod resolve_tests;
