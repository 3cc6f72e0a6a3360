//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Directory under the home directory holding config, logs and process state
pub const APP_DIR_NAME: &str = ".vfx-launcher";

/// Config file name inside the app directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "VFX_LAUNCHER_CONFIG";

/// Upper bound for one interpreter run (load + eval + save), in milliseconds.
/// Loading a heavy scene can take well over a minute.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Missing markers degrade to empty/unavailable by default
pub const DEFAULT_STRICT_OUTPUT: bool = false;

/// Interpreter binary name, sibling to the Houdini executable
#[cfg(windows)]
pub const HYTHON_BINARY: &str = "hython.exe";
#[cfg(not(windows))]
pub const HYTHON_BINARY: &str = "hython";
