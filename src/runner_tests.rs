//! Interpreter runner tests.
//!
//! The "interpreter" is `/bin/sh` running a stub script that receives the
//! generated script path as `$1`, so no freshly written file is ever exec'd.

use super::*;
use crate::process_manager::{is_process_running, ProcessManager};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SCRIPT: &str = "import hou\nprint('hello')\n";

fn stub_runner(dir: &TempDir, body: &str, timeout: Duration) -> (ScriptRunner, Arc<ProcessManager>) {
    let stub = dir.path().join("stub.sh");
    fs::write(&stub, body).unwrap();
    let registry = Arc::new(ProcessManager::in_memory());
    let runner = ScriptRunner::new("/bin/sh", timeout)
        .with_leading_args(vec![stub.to_string_lossy().into_owned()])
        .with_script_dir(Some(dir.path().to_path_buf()))
        .with_registry(Arc::clone(&registry));
    (runner, registry)
}

fn leftover_scripts(dir: &TempDir) -> Vec<String> {
    fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("nodebridge-"))
        .collect()
}

#[cfg(unix)]
#[test]
fn test_run_delivers_script_and_captures_stdout() {
    let dir = TempDir::new().unwrap();
    let (runner, _) = stub_runner(&dir, "cat \"$1\"\n", Duration::from_secs(10));

    let output = runner.run(SCRIPT, "/shots/a.hip", &CancelToken::new()).unwrap();

    assert_eq!(output.stdout, SCRIPT);
    assert_eq!(output.stderr, "");
    assert_eq!(output.exit_code, 0);
    assert!(leftover_scripts(&dir).is_empty());
}

#[cfg(unix)]
#[test]
fn test_non_zero_exit_reports_stderr_and_removes_script() {
    let dir = TempDir::new().unwrap();
    let body = "echo \"$1\" > \"$(dirname \"$1\")/seen_path.txt\"\n\
                printf 'Traceback (most recent call last):\\nAttributeError: nope\\n' >&2\n\
                exit 2\n";
    let (runner, registry) = stub_runner(&dir, body, Duration::from_secs(10));

    let err = runner
        .run(SCRIPT, "/shots/a.hip", &CancelToken::new())
        .unwrap_err();

    match err {
        BridgeError::NonZeroExit { code, stderr } => {
            assert_eq!(code, 2);
            assert_eq!(stderr, "Traceback (most recent call last):\nAttributeError: nope\n");
        }
        other => panic!("Expected NonZeroExit, got {:?}", other),
    }

    let seen = fs::read_to_string(dir.path().join("seen_path.txt")).unwrap();
    assert!(!std::path::Path::new(seen.trim()).exists());
    assert!(leftover_scripts(&dir).is_empty());
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn test_missing_interpreter_is_spawn_error() {
    let dir = TempDir::new().unwrap();
    let runner = ScriptRunner::new("/definitely/not/here/hython", Duration::from_secs(5))
        .with_script_dir(Some(dir.path().to_path_buf()))
        .with_registry(Arc::new(ProcessManager::in_memory()));

    let err = runner
        .run(SCRIPT, "/shots/a.hip", &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, BridgeError::Spawn { .. }), "got {:?}", err);
    assert!(leftover_scripts(&dir).is_empty());
}

#[test]
fn test_unwritable_script_dir_is_script_file_error() {
    let dir = TempDir::new().unwrap();
    let runner = ScriptRunner::new("/bin/sh", Duration::from_secs(5))
        .with_script_dir(Some(dir.path().join("does-not-exist")))
        .with_registry(Arc::new(ProcessManager::in_memory()));

    let err = runner
        .run(SCRIPT, "/shots/a.hip", &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::ScriptFile(_)), "got {:?}", err);
}

#[cfg(unix)]
#[test]
fn test_timeout_kills_interpreter() {
    let dir = TempDir::new().unwrap();
    let body = "echo $$ > \"$(dirname \"$1\")/pid.txt\"\nexec sleep 30\n";
    let (runner, registry) = stub_runner(&dir, body, Duration::from_millis(400));

    let start = Instant::now();
    let err = runner
        .run(SCRIPT, "/shots/a.hip", &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, BridgeError::Timeout { .. }), "got {:?}", err);
    assert!(start.elapsed() < Duration::from_secs(10));

    let pid: u32 = fs::read_to_string(dir.path().join("pid.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!is_process_running(pid), "interpreter {} still running", pid);
    assert_eq!(registry.active_count(), 0);
    assert!(leftover_scripts(&dir).is_empty());
}

#[cfg(unix)]
#[test]
fn test_timeout_also_kills_grandchildren() {
    let dir = TempDir::new().unwrap();
    let body = "sleep 30 &\necho $! > \"$(dirname \"$1\")/child.txt\"\nwait\n";
    let (runner, _) = stub_runner(&dir, body, Duration::from_millis(400));

    let err = runner
        .run(SCRIPT, "/shots/a.hip", &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }));

    let child_pid: u32 = fs::read_to_string(dir.path().join("child.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    // The killed grandchild is reparented and reaped by init; give it a moment
    let start = Instant::now();
    while is_process_running(child_pid) && start.elapsed() < Duration::from_secs(3) {
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(!is_process_running(child_pid));
}

#[cfg(unix)]
#[test]
fn test_cancel_during_run_kills_interpreter() {
    let dir = TempDir::new().unwrap();
    let (runner, registry) = stub_runner(&dir, "exec sleep 30\n", Duration::from_secs(60));
    let cancel = CancelToken::new();

    let canceller = {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        })
    };

    let start = Instant::now();
    let err = runner.run(SCRIPT, "/shots/a.hip", &cancel).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, BridgeError::Cancelled), "got {:?}", err);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(registry.active_count(), 0);
}

#[cfg(unix)]
#[test]
fn test_pre_cancelled_call_never_spawns() {
    let dir = TempDir::new().unwrap();
    let body = "touch \"$(dirname \"$1\")/ran.txt\"\n";
    let (runner, _) = stub_runner(&dir, body, Duration::from_secs(10));
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = runner.run(SCRIPT, "/shots/a.hip", &cancel).unwrap_err();

    assert!(matches!(err, BridgeError::Cancelled));
    assert!(!dir.path().join("ran.txt").exists());
    assert!(leftover_scripts(&dir).is_empty());
}

#[cfg(unix)]
#[test]
fn test_large_output_does_not_block() {
    let dir = TempDir::new().unwrap();
    let body = "i=0\nwhile [ $i -lt 5000 ]; do echo \"/obj/geo$i\"; echo \"warn $i\" >&2; i=$((i+1)); done\n";
    let (runner, _) = stub_runner(&dir, body, Duration::from_secs(30));

    let output = runner.run(SCRIPT, "/shots/a.hip", &CancelToken::new()).unwrap();

    assert_eq!(output.stdout.lines().count(), 5000);
    assert_eq!(output.stderr.lines().count(), 5000);
    assert!(output.stdout.ends_with("/obj/geo4999\n"));
}

#[test]
fn test_cancel_token_clones_share_state() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!token.is_cancelled());
    clone.cancel();
    assert!(token.is_cancelled());
}
