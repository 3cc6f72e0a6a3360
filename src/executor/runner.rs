//! One-shot interpreter execution
//!
//! Writes a generated script to a transient file, runs
//! `<interpreter> [args..] <script>` in its own process group, and collects
//! stdout, stderr and the exit code. The script file and the child are both
//! gone by the time [`ScriptRunner::run`] returns, whatever the outcome.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tracing::{debug, info, instrument, warn};

use super::output_capture::{spawn_output_reader, Stream};
use crate::error::{BridgeError, Result, ResultExt};
use crate::process_manager::{ProcessManager, PROCESS_MANAGER};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Grace period after SIGTERM before escalating to SIGKILL
const TERM_GRACE: Duration = Duration::from_millis(250);
/// How often the child is polled while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long to wait for pipe readers once the child is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// Unix-specific process group control using libc
#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Send a signal to a process group (negative PID targets the group)
    pub fn kill_process_group(pgid: u32, signal: c_int) -> Result<(), &'static str> {
        let Ok(pgid) = pid_t::try_from(pgid) else {
            return Err("Invalid process group");
        };
        if pgid <= 0 {
            return Err("Invalid process group");
        }
        // Safety: kill() is a plain syscall with no memory safety concerns
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            match errno {
                ESRCH => Err("No such process group"),
                libc::EPERM => Err("Permission denied"),
                libc::EINVAL => Err("Invalid signal"),
                _ => Err("Unknown error"),
            }
        }
    }

    pub const SIGTERM: c_int = libc::SIGTERM;
    pub const SIGKILL: c_int = libc::SIGKILL;
}

/// Forcefully kill a process and everything in its process group.
///
/// Used for interpreters whose `Child` handle is not available (orphans from
/// an earlier session, registry shutdown).
pub fn kill_process_tree(pid: u32) {
    #[cfg(unix)]
    {
        match unix_process::kill_process_group(pid, unix_process::SIGKILL) {
            Ok(()) => debug!(pid = pid, "Killed process group"),
            Err(e) => debug!(pid = pid, reason = e, "Process group kill skipped"),
        }
    }

    #[cfg(not(unix))]
    {
        let mut system = sysinfo::System::new();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[target]), true);
        if let Some(process) = system.process(target) {
            let _ = process.kill();
        }
    }
}

/// Shared cancellation flag for one bridge call.
///
/// Cloning shares the flag; cancelling any clone cancels the call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything captured from one finished interpreter run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Tracks a spawned interpreter for cleanup.
///
/// Registered with the process manager on creation. Dropping a handle whose
/// child was never reaped kills the whole process group.
#[derive(Debug)]
struct ProcessHandle {
    /// Process ID (also the PGID since we spawn with process_group(0))
    pid: u32,
    registry: Arc<ProcessManager>,
    reaped: bool,
}

impl ProcessHandle {
    fn new(pid: u32, registry: Arc<ProcessManager>, script_path: &Path, document: &str) -> Self {
        registry.register_process(pid, &script_path.to_string_lossy(), document);
        Self {
            pid,
            registry,
            reaped: false,
        }
    }

    /// Terminate the child with graceful escalation and reap it.
    ///
    /// 1. SIGTERM to the process group
    /// 2. Poll the child for up to TERM_GRACE
    /// 3. SIGKILL to the group (also catches stragglers the leader left behind)
    fn terminate(&mut self, child: &mut Child) {
        #[cfg(unix)]
        {
            use unix_process::{kill_process_group, SIGKILL, SIGTERM};

            if let Err(e) = kill_process_group(self.pid, SIGTERM) {
                debug!(pid = self.pid, reason = e, "SIGTERM not delivered");
            }

            let start = Instant::now();
            while start.elapsed() < TERM_GRACE {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }

            if let Err(e) = kill_process_group(self.pid, SIGKILL) {
                debug!(pid = self.pid, reason = e, "SIGKILL not delivered");
            }
        }

        // Non-unix has no group to signal; also covers a leader that ignored SIGTERM
        let _ = child.kill();
        child.wait().warn_on_err();
        self.reaped = true;
        info!(pid = self.pid, "Interpreter terminated");
    }

    /// Kill anything the reaped leader left running in its group.
    fn sweep_stragglers(&self) {
        #[cfg(unix)]
        if unix_process::kill_process_group(self.pid, unix_process::SIGKILL).is_ok() {
            warn!(pid = self.pid, "Killed processes left behind by interpreter");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.registry.unregister_process(self.pid);
        if !self.reaped {
            kill_process_tree(self.pid);
        }
    }
}

/// Runs generated scripts in the external interpreter, one process per call.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    interpreter: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
    script_dir: Option<PathBuf>,
    registry: Arc<ProcessManager>,
}

impl ScriptRunner {
    pub fn new(interpreter: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            leading_args: Vec::new(),
            timeout,
            script_dir: None,
            registry: Arc::clone(&*PROCESS_MANAGER),
        }
    }

    /// Arguments placed between the interpreter and the script path
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// Directory for transient script files (default: system temp dir)
    pub fn with_script_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.script_dir = dir;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProcessManager>) -> Self {
        self.registry = registry;
        self
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one script to completion.
    ///
    /// Exit code zero yields the captured output; any other exit code is
    /// reported as [`BridgeError::NonZeroExit`] with stderr verbatim.
    #[instrument(skip_all, fields(interpreter = %self.interpreter.display(), document = %document))]
    pub fn run(&self, source: &str, document: &str, cancel: &CancelToken) -> Result<RunOutput> {
        let script_path = self.write_script(source)?;
        let result = self.execute(&script_path, document, cancel);

        let script_name = script_path.display().to_string();
        if script_path.close().warn_on_err().is_some() {
            debug!(script = %script_name, "Transient script removed");
        }

        let output = result?;
        if output.exit_code != 0 {
            return Err(BridgeError::NonZeroExit {
                code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    fn write_script(&self, source: &str) -> Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nodebridge-").suffix(".py");

        let mut file = match &self.script_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(BridgeError::ScriptFile)?;

        file.write_all(source.as_bytes())
            .and_then(|_| file.flush())
            .map_err(BridgeError::ScriptFile)?;

        // Close our handle so the interpreter can open the file on every platform
        Ok(file.into_temp_path())
    }

    fn execute(&self, script_path: &Path, document: &str, cancel: &CancelToken) -> Result<RunOutput> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let start = Instant::now();
        let mut command = Command::new(&self.interpreter);
        command
            .args(&self.leading_args)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // process_group(0) makes the child's PID its PGID so the whole tree can be killed
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            warn!(error = %e, "Interpreter spawn failed");
            BridgeError::Spawn {
                interpreter: self.interpreter.clone(),
                message: e.to_string(),
            }
        })?;

        let pid = child.id();
        info!(pid = pid, "Interpreter spawned");
        let mut handle = ProcessHandle::new(pid, Arc::clone(&self.registry), script_path, document);

        let label = script_path.display().to_string();
        let stdout = child
            .stdout
            .take()
            .map(|pipe| spawn_output_reader(pipe, Stream::Stdout, label.clone()));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| spawn_output_reader(pipe, Stream::Stderr, label));

        let status = self.wait_for_exit(&mut child, &mut handle, cancel)?;

        let output = RunOutput {
            stdout: stdout.map(|c| c.into_text(DRAIN_TIMEOUT)).unwrap_or_default(),
            stderr: stderr.map(|c| c.into_text(DRAIN_TIMEOUT)).unwrap_or_default(),
            exit_code: status.code().unwrap_or(-1),
        };

        info!(
            pid = pid,
            exit_code = output.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Interpreter finished"
        );
        Ok(output)
    }

    fn wait_for_exit(
        &self,
        child: &mut Child,
        handle: &mut ProcessHandle,
        cancel: &CancelToken,
    ) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    handle.reaped = true;
                    handle.sweep_stragglers();
                    return Ok(status);
                }
                Ok(None) => {}
                Err(e) => {
                    handle.terminate(child);
                    return Err(BridgeError::Spawn {
                        interpreter: self.interpreter.clone(),
                        message: format!("Failed to wait for interpreter: {}", e),
                    });
                }
            }

            if cancel.is_cancelled() {
                warn!(pid = handle.pid, "Cancelled, terminating interpreter");
                handle.terminate(child);
                return Err(BridgeError::Cancelled);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    pid = handle.pid,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Interpreter timed out, terminating"
                );
                handle.terminate(child);
                return Err(BridgeError::Timeout {
                    timeout: self.timeout,
                });
            }

            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

#[cfg(test)]
#[path = "../runner_tests.rs"]
mod tests;
