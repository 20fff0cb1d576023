mod common;
mod info_tests;
mod install_tests;
mod uninstall_tests;
mod upgrade_tests;
