//! Configuration type definitions

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use super::loader::expand_path;

// ============================================
// APPLICATION PATHS
// ============================================

/// Install locations chosen in the settings window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPaths {
    /// Houdini executable (or its bin directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub houdini: Option<String>,
    /// Nuke X executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nuke: Option<String>,
    /// Explicit hython override; wins over the Houdini sibling lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hython: Option<String>,
}

impl AppPaths {
    pub fn houdini_path(&self) -> Option<PathBuf> {
        non_empty(&self.houdini).map(expand_path)
    }

    pub fn nuke_path(&self) -> Option<PathBuf> {
        non_empty(&self.nuke).map(expand_path)
    }

    pub fn hython_path(&self) -> Option<PathBuf> {
        non_empty(&self.hython).map(expand_path)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================
// BRIDGE CONFIG
// ============================================

/// What setting a parameter that does not exist on the node should do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingParameterPolicy {
    /// Skip the set, still save the document, report success
    #[default]
    Ignore,
    /// Fail the call without touching the document
    Error,
}

/// Settings for the node bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Per-call interpreter time bound in milliseconds (default: 120000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Treat missing output markers as errors (default: false)
    #[serde(default = "default_strict_output")]
    pub strict_output: bool,
    /// Behavior when setting an unknown parameter (default: "ignore")
    #[serde(default)]
    pub missing_parameter: MissingParameterPolicy,
    /// Extra arguments placed before the script path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpreter_args: Vec<String>,
    /// Directory for transient scripts (default: system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
fn default_strict_output() -> bool {
    DEFAULT_STRICT_OUTPUT
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn script_dir(&self) -> Option<PathBuf> {
        non_empty(&self.script_dir).map(expand_path)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            strict_output: DEFAULT_STRICT_OUTPUT,
            missing_parameter: MissingParameterPolicy::default(),
            interpreter_args: Vec::new(),
            script_dir: None,
        }
    }
}

// ============================================
// MAIN CONFIG
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub paths: AppPaths,
    #[serde(default)]
    pub bridge: BridgeConfig,
}
