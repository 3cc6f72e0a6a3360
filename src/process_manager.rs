//! Process Manager Module
//!
//! Tracks every interpreter child the bridge has in flight.
//!
//! This module provides:
//! - Thread-safe process registration/unregistration
//! - One PIDs file per launcher instance at
//!   ~/.vfx-launcher/active-interpreters-<launcher pid>.json
//! - Orphan detection on startup (interpreters left behind by a crashed
//!   instance; files owned by a live launcher are left alone)
//! - Bulk kill for graceful shutdown

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

use crate::config;
use crate::error::ResultExt;
use crate::executor::kill_process_tree;
use crate::logging;

/// Global process manager shared by every runner built from config
pub static PROCESS_MANAGER: LazyLock<Arc<ProcessManager>> =
    LazyLock::new(|| Arc::new(ProcessManager::new()));

const PIDS_FILE_PREFIX: &str = "active-interpreters-";
const PIDS_FILE_SUFFIX: &str = ".json";

/// Information about a tracked interpreter process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Transient script the interpreter was started with
    pub script_path: String,
    /// Document the script operates on
    pub document: String,
    pub started_at: DateTime<Utc>,
}

/// On-disk record of one launcher instance's interpreters
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PidsFile {
    owner_pid: u32,
    processes: Vec<ProcessInfo>,
}

#[derive(Debug)]
pub struct ProcessManager {
    active_processes: RwLock<HashMap<u32, ProcessInfo>>,
    /// Directory holding the per-instance PIDs files; None keeps tracking in memory only
    registry_dir: Option<PathBuf>,
    /// Launcher process that owns this manager's PIDs file
    owner_pid: u32,
}

impl ProcessManager {
    /// Create a ProcessManager persisting under ~/.vfx-launcher for this process
    pub fn new() -> Self {
        Self::with_dir(config::app_dir())
    }

    pub fn with_dir(registry_dir: PathBuf) -> Self {
        Self::with_owner(registry_dir, std::process::id())
    }

    /// Registry owned by an explicit launcher PID
    pub fn with_owner(registry_dir: PathBuf, owner_pid: u32) -> Self {
        Self {
            active_processes: RwLock::new(HashMap::new()),
            registry_dir: Some(registry_dir),
            owner_pid,
        }
    }

    /// Tracking without a PIDs file (tests, embedded use)
    pub fn in_memory() -> Self {
        Self {
            active_processes: RwLock::new(HashMap::new()),
            registry_dir: None,
            owner_pid: std::process::id(),
        }
    }

    /// This instance's PIDs file, if it persists at all
    pub fn pids_file(&self) -> Option<PathBuf> {
        self.registry_dir
            .as_ref()
            .map(|dir| dir.join(pids_file_name(self.owner_pid)))
    }

    pub fn register_process(&self, pid: u32, script_path: &str, document: &str) {
        logging::log(
            "PROC",
            &format!("Registering interpreter PID {} for {}", pid, document),
        );

        self.active_processes.write().insert(
            pid,
            ProcessInfo {
                pid,
                script_path: script_path.to_string(),
                document: document.to_string(),
                started_at: Utc::now(),
            },
        );
        self.persist_active_pids().log_err();
    }

    pub fn unregister_process(&self, pid: u32) {
        tracing::debug!(pid = pid, "Unregistering interpreter");
        self.active_processes.write().remove(&pid);
        self.persist_active_pids().log_err();
    }

    pub fn get_active_processes(&self) -> Vec<ProcessInfo> {
        self.active_processes.read().values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_processes.read().len()
    }

    /// Kill all tracked interpreters and clear tracking.
    ///
    /// Used during shutdown.
    pub fn kill_all_processes(&self) {
        let processes: Vec<ProcessInfo> = self
            .active_processes
            .write()
            .drain()
            .map(|(_, info)| info)
            .collect();

        if processes.is_empty() {
            logging::log("PROC", "No active interpreters to kill");
        } else {
            logging::log(
                "PROC",
                &format!("Killing {} active interpreter(s)", processes.len()),
            );
            for info in &processes {
                kill_process_tree(info.pid);
            }
        }

        if let Some(path) = self.pids_file() {
            remove_pids_file(&path);
        }
    }

    pub fn is_process_running(&self, pid: u32) -> bool {
        is_process_running(pid)
    }

    /// Detect and kill interpreters recorded by launcher instances that are gone.
    ///
    /// PIDs files whose owner is still running belong to another live
    /// instance and are skipped. Returns the number of orphans killed.
    pub fn cleanup_orphans(&self) -> usize {
        let mut killed_count = 0;

        for path in self.foreign_pids_files() {
            let Some(record) = load_pids_file(&path) else {
                remove_pids_file(&path);
                continue;
            };
            if is_process_running(record.owner_pid) {
                tracing::debug!(
                    owner_pid = record.owner_pid,
                    "Skipping interpreters of a running launcher"
                );
                continue;
            }

            if !record.processes.is_empty() {
                logging::log(
                    "PROC",
                    &format!(
                        "Found {} interpreter(s) from crashed launcher PID {}",
                        record.processes.len(),
                        record.owner_pid
                    ),
                );
            }
            for info in &record.processes {
                if is_process_running(info.pid) {
                    logging::log(
                        "PROC",
                        &format!(
                            "Killing orphaned interpreter PID {} (document: {})",
                            info.pid, info.document
                        ),
                    );
                    kill_process_tree(info.pid);
                    killed_count += 1;
                }
            }
            remove_pids_file(&path);
        }

        killed_count
    }

    /// PIDs files in the registry directory other than this instance's own
    fn foreign_pids_files(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.registry_dir else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let own = pids_file_name(self.owner_pid);

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let is_pids_file =
                    name.starts_with(PIDS_FILE_PREFIX) && name.ends_with(PIDS_FILE_SUFFIX);
                (is_pids_file && name != own).then(|| entry.path())
            })
            .collect()
    }

    fn persist_active_pids(&self) -> anyhow::Result<()> {
        let Some(path) = self.pids_file() else {
            return Ok(());
        };

        let record = PidsFile {
            owner_pid: self.owner_pid,
            processes: self.get_active_processes(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

fn pids_file_name(owner_pid: u32) -> String {
    format!("{}{}{}", PIDS_FILE_PREFIX, owner_pid, PIDS_FILE_SUFFIX)
}

fn load_pids_file(path: &Path) -> Option<PidsFile> {
    if !path.exists() {
        return None;
    }
    fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|contents| Ok(serde_json::from_str(&contents)?))
        .warn_on_err()
}

fn remove_pids_file(path: &Path) {
    if path.exists() {
        fs::remove_file(path).warn_on_err();
    }
}

/// Check whether a PID is currently alive (zombies awaiting reaping count as gone)
pub fn is_process_running(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system
        .process(target)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}
