//! Interpreter lookup from configured install paths.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{AppPaths, HYTHON_BINARY};
use crate::error::{BridgeError, Result};

/// Resolve the hython executable.
///
/// Order: explicit `paths.hython`, then a `hython` sibling of the configured
/// Houdini executable (or inside it when the path is a directory), then `PATH`.
pub fn resolve_interpreter(paths: &AppPaths) -> Result<PathBuf> {
    if let Some(explicit) = paths.hython_path() {
        info!(interpreter = %explicit.display(), "Using configured hython");
        return Ok(explicit);
    }

    if let Some(houdini) = paths.houdini_path() {
        match sibling_interpreter(&houdini) {
            Some(found) => {
                info!(interpreter = %found.display(), "Found hython next to Houdini");
                return Ok(found);
            }
            None => debug!(houdini = %houdini.display(), "No hython next to Houdini"),
        }
    }

    which::which(HYTHON_BINARY)
        .inspect(|found| info!(interpreter = %found.display(), "Found hython on PATH"))
        .map_err(|e| BridgeError::Spawn {
            interpreter: PathBuf::from(HYTHON_BINARY),
            message: format!(
                "hython not configured, not next to Houdini and not on PATH ({})",
                e
            ),
        })
}

/// `hython` in the same directory as `houdini`, or inside it if it is a directory
fn sibling_interpreter(houdini: &Path) -> Option<PathBuf> {
    let dir = if houdini.is_dir() {
        houdini
    } else {
        houdini.parent()?
    };
    let candidate = dir.join(HYTHON_BINARY);
    candidate.is_file().then_some(candidate)
}
