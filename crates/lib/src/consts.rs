//! Crate-wide constants.

/// Application name, used for directory names.
pub const APP_NAME: &str = "keg";

/// Registry file format version.
pub const REGISTRY_VERSION: u32 = 1;

/// Registry file name inside the install root.
pub const REGISTRY_FILENAME: &str = "registry.json";

/// Default search path handed to build steps after dependency `bin` dirs.
pub const DEFAULT_BASE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// January 1, 1980 00:00:00 UTC, exported as `SOURCE_DATE_EPOCH` to build steps.
pub const SOURCE_DATE_EPOCH: &str = "315532800";
