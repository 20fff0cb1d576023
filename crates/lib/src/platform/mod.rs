//! Host platform detection and on-disk layout.

pub mod os;
pub mod paths;

pub use os::Os;
