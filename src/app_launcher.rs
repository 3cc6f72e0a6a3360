//! App Launcher Module
//!
//! Launches the DCC applications configured in settings (Houdini, Nuke) with
//! the platform's default handler, detached from the launcher.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppPaths;

/// Applications the launcher knows how to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DccApp {
    Houdini,
    Nuke,
}

impl DccApp {
    pub fn display_name(self) -> &'static str {
        match self {
            DccApp::Houdini => "Houdini",
            DccApp::Nuke => "Nuke X",
        }
    }

    /// Configured executable, if any
    pub fn configured_path(self, paths: &AppPaths) -> Option<PathBuf> {
        match self {
            DccApp::Houdini => paths.houdini_path(),
            DccApp::Nuke => paths.nuke_path(),
        }
    }
}

impl fmt::Display for DccApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Resolve the executable for `app`, failing if settings don't name one.
pub fn resolve_application(app: DccApp, paths: &AppPaths) -> Result<PathBuf> {
    match app.configured_path(paths) {
        Some(path) => Ok(path),
        None => bail!("{} path not configured. Set it in Settings.", app),
    }
}

/// Launch an application from settings
pub fn launch_application(app: DccApp, paths: &AppPaths) -> Result<PathBuf> {
    let path = resolve_application(app, paths)?;
    info!(
        app_name = %app,
        app_path = %path.display(),
        "Launching application"
    );

    open::that_detached(&path)
        .with_context(|| format!("Failed to launch {}: {}", app, path.display()))?;

    Ok(path)
}
