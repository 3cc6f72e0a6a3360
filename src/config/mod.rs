//! Configuration module - launcher settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.vfx-launcher/config.json
//! - Default values for all settings
//! - Type definitions for config structures
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - Configuration struct definitions (Config, AppPaths, BridgeConfig)
//! - `loader` - File system loading, saving and path resolution

mod defaults;
mod loader;
mod types;

pub use defaults::{CONFIG_PATH_ENV, DEFAULT_TIMEOUT_MS, HYTHON_BINARY};

pub use types::{AppPaths, BridgeConfig, Config, MissingParameterPolicy};

pub use loader::{app_dir, config_path, expand_path, load_config, load_config_from, save_config};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
