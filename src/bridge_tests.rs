//! Node bridge tests.
//!
//! Ordering, concurrency and cancellation use in-memory transports. The
//! hython transport is exercised with `/bin/sh` stub interpreters that read
//! or ignore the generated script passed as `$1`.

use super::*;
use crate::config::{BridgeConfig, MissingParameterPolicy};
use crate::executor::ScriptRunner;
use crate::hython::{INVALID_VALUE_EXIT_CODE, MISSING_PARAMETER_EXIT_CODE};
use crate::process_manager::{is_process_running, ProcessManager};
use parking_lot::Condvar;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const DOC_A: &str = "/shots/sh010/a.hip";
const DOC_B: &str = "/shots/sh020/b.hip";

// ============================================
// In-memory transports
// ============================================

/// Keeps parameter values per document, with an optional delay per set
#[derive(Default)]
struct MemoryTransport {
    values: Mutex<HashMap<(PathBuf, String, String), String>>,
    calls: Mutex<Vec<String>>,
    set_delay: HashMap<String, Duration>,
}

impl Transport for MemoryTransport {
    fn call(&self, request: &Request, _cancel: &CancelToken) -> Result<Response> {
        match request {
            Request::ListNodes { .. } => {
                self.calls.lock().push("listNodes".to_string());
                Ok(Response::Nodes(vec!["/obj".into(), "/obj/geo1".into()]))
            }
            Request::ListParameters { node, .. } => {
                self.calls.lock().push(format!("listParameters {}", node));
                Ok(Response::Parameters(vec!["tx".into(), "ty".into()]))
            }
            Request::GetParameterValue {
                document,
                node,
                parameter,
            } => {
                self.calls.lock().push(format!("get {}", parameter));
                let key = (document.clone(), node.clone(), parameter.clone());
                Ok(Response::Value(
                    self.values
                        .lock()
                        .get(&key)
                        .cloned()
                        .map(ParameterReading::Value)
                        .unwrap_or(ParameterReading::Unavailable),
                ))
            }
            Request::SetParameterValue {
                document,
                node,
                parameter,
                value,
            } => {
                if let Some(delay) = self.set_delay.get(value) {
                    std::thread::sleep(*delay);
                }
                self.calls.lock().push(format!("set {}={}", parameter, value));
                let key = (document.clone(), node.clone(), parameter.clone());
                self.values.lock().insert(key, value.clone());
                Ok(Response::Saved)
            }
        }
    }
}

/// Blocks calls on documents listed in `held` until `release` is called
#[derive(Default)]
struct GatedTransport {
    held: Vec<PathBuf>,
    open: Mutex<bool>,
    opened: Condvar,
    calls: Mutex<Vec<PathBuf>>,
}

impl GatedTransport {
    fn holding(documents: &[&str]) -> Self {
        Self {
            held: documents.iter().map(PathBuf::from).collect(),
            ..Default::default()
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl Transport for GatedTransport {
    fn call(&self, request: &Request, _cancel: &CancelToken) -> Result<Response> {
        self.calls.lock().push(request.document().to_path_buf());
        if self.held.iter().any(|d| d == request.document()) {
            let mut open = self.open.lock();
            if !*open {
                let timed_out = self
                    .opened
                    .wait_for(&mut open, Duration::from_secs(5))
                    .timed_out();
                if timed_out {
                    return Err(BridgeError::Timeout {
                        timeout: Duration::from_secs(5),
                    });
                }
            }
        }
        Ok(Response::Nodes(vec![request.document().display().to_string()]))
    }
}

// ============================================
// Orchestration
// ============================================

fn wait_for_lane_count<T: Transport>(bridge: &NodeBridge<T>, expected: usize) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if bridge.lane_count() == expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_same_document_runs_in_submission_order() {
    let transport = MemoryTransport {
        // The first set is slow; a concurrent runner would let the second finish first
        set_delay: HashMap::from([("1".to_string(), Duration::from_millis(150))]),
        ..Default::default()
    };
    let bridge = NodeBridge::new(transport);

    let first = bridge.set_parameter_value(DOC_A, "/obj/geo1", "tx", "1");
    let second = bridge.set_parameter_value(DOC_A, "/obj/geo1", "tx", "2");
    let read = bridge.get_parameter_value(DOC_A, "/obj/geo1", "tx");

    second.wait().unwrap();
    first.wait().unwrap();
    assert_eq!(read.wait().unwrap(), ParameterReading::Value("2".to_string()));

    assert_eq!(
        *bridge.transport().calls.lock(),
        vec!["set tx=1", "set tx=2", "get tx"]
    );
}

#[test]
fn test_set_then_get_round_trip() {
    let bridge = NodeBridge::new(MemoryTransport::default());

    assert_eq!(
        bridge
            .get_parameter_value(DOC_A, "/obj/geo1", "scale")
            .wait()
            .unwrap(),
        ParameterReading::Unavailable
    );
    bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "scale", "2.5")
        .wait()
        .unwrap();
    assert_eq!(
        bridge
            .get_parameter_value(DOC_A, "/obj/geo1", "scale")
            .wait()
            .unwrap(),
        ParameterReading::Value("2.5".to_string())
    );
    // Other documents are unaffected
    assert_eq!(
        bridge
            .get_parameter_value(DOC_B, "/obj/geo1", "scale")
            .wait()
            .unwrap(),
        ParameterReading::Unavailable
    );
}

#[test]
fn test_different_documents_run_concurrently() {
    let bridge = NodeBridge::new(GatedTransport::holding(&[DOC_A]));

    let held = bridge.list_nodes(DOC_A);
    // Completes while DOC_A's call is still blocked
    let other = bridge.list_nodes(DOC_B).wait().unwrap();
    assert_eq!(other, vec![DOC_B.to_string()]);
    assert!(held.try_result().is_none());

    // DOC_A's lane is still busy
    assert!(bridge.lane_count() >= 1);

    bridge.transport().release();
    assert_eq!(held.wait().unwrap(), vec![DOC_A.to_string()]);
}

#[test]
fn test_idle_lanes_stop_and_restart_on_demand() {
    let bridge = NodeBridge::new(MemoryTransport::default());

    bridge.list_nodes(DOC_A).wait().unwrap();
    bridge.list_nodes(DOC_B).wait().unwrap();
    assert!(wait_for_lane_count(&bridge, 0));

    bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "tx", "3")
        .wait()
        .unwrap();
    assert_eq!(
        bridge
            .get_parameter_value(DOC_A, "/obj/geo1", "tx")
            .wait()
            .unwrap(),
        ParameterReading::Value("3".to_string())
    );
    assert!(wait_for_lane_count(&bridge, 0));
}

#[test]
fn test_calls_queued_back_to_back_survive_lane_turnover() {
    let bridge = NodeBridge::new(MemoryTransport::default());

    for round in 0..50 {
        let value = round.to_string();
        bridge
            .set_parameter_value(DOC_A, "/obj/geo1", "tx", value.as_str())
            .wait()
            .unwrap();
        assert_eq!(
            bridge
                .get_parameter_value(DOC_A, "/obj/geo1", "tx")
                .wait()
                .unwrap(),
            ParameterReading::Value(value)
        );
    }
}

#[test]
fn test_cancel_while_queued_skips_the_call() {
    let bridge = NodeBridge::new(GatedTransport::holding(&[DOC_A]));

    let running = bridge.list_nodes(DOC_A);
    let queued = bridge.list_nodes(DOC_A);
    queued.cancel();
    bridge.transport().release();

    assert!(running.wait().is_ok());
    assert!(matches!(queued.wait(), Err(BridgeError::Cancelled)));
    assert_eq!(bridge.transport().calls.lock().len(), 1);
}

#[test]
fn test_last_document_tracks_latest_submission() {
    let bridge = NodeBridge::new(MemoryTransport::default());
    assert_eq!(bridge.last_document(), None);

    bridge.list_nodes(DOC_A).wait().unwrap();
    bridge.list_parameters(DOC_B, "/obj/geo1").wait().unwrap();
    assert_eq!(bridge.last_document(), Some(PathBuf::from(DOC_B)));
}

#[test]
fn test_try_result_reports_completion_once() {
    let bridge = NodeBridge::new(MemoryTransport::default());
    let call = bridge.list_parameters(DOC_A, "/obj/geo1");

    let start = std::time::Instant::now();
    let result = loop {
        if let Some(result) = call.try_result() {
            break result;
        }
        assert!(start.elapsed() < Duration::from_secs(5));
        std::thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(result.unwrap(), vec!["tx", "ty"]);
    assert_eq!(call.operation(), "listParameters");
}

#[test]
fn test_wrong_response_kind_surfaces_as_error() {
    struct Confused;
    impl Transport for Confused {
        fn call(&self, _request: &Request, _cancel: &CancelToken) -> Result<Response> {
            Ok(Response::Saved)
        }
    }

    let bridge = NodeBridge::new(Confused);
    let err = bridge.list_nodes(DOC_A).wait().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::UnexpectedResponse {
            operation: "listNodes"
        }
    ));
}

#[test]
fn test_transport_errors_are_not_retried() {
    struct Failing(Mutex<u32>);
    impl Transport for Failing {
        fn call(&self, _request: &Request, _cancel: &CancelToken) -> Result<Response> {
            *self.0.lock() += 1;
            Err(BridgeError::NonZeroExit {
                code: 1,
                stderr: "boom".to_string(),
            })
        }
    }

    let bridge = NodeBridge::new(Failing(Mutex::new(0)));
    assert!(bridge.list_nodes(DOC_A).wait().is_err());
    assert_eq!(*bridge.transport().0.lock(), 1);
}

// ============================================
// Hython transport with stub interpreters
// ============================================

struct Stub {
    dir: TempDir,
    registry: Arc<ProcessManager>,
}

impl Stub {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            registry: Arc::new(ProcessManager::in_memory()),
        }
    }

    fn bridge(&self, body: &str, config: BridgeConfig) -> NodeBridge<HythonTransport> {
        let stub = self.dir.path().join("hython-stub.sh");
        fs::write(&stub, body).unwrap();
        let runner = ScriptRunner::new("/bin/sh", config.timeout())
            .with_leading_args(vec![stub.to_string_lossy().into_owned()])
            .with_script_dir(Some(self.dir.path().to_path_buf()))
            .with_registry(Arc::clone(&self.registry));
        NodeBridge::new(HythonTransport::new(runner, &config))
    }

    fn leftover_scripts(&self) -> usize {
        fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("nodebridge-"))
            .count()
    }
}

fn strict() -> BridgeConfig {
    BridgeConfig {
        strict_output: true,
        ..Default::default()
    }
}

#[cfg(unix)]
#[test]
fn test_hython_list_nodes_in_emitted_order() {
    let stub = Stub::new();
    let body = "echo 'Houdini Core 20.5 (license banner)'\n\
                echo NODE_LIST_START\n\
                for n in /obj /obj/geo1 /obj/geo1/box1 /obj/cam1 /out /out/mantra1; do echo \"$n\"; done\n\
                echo NODE_LIST_END\n";
    let bridge = stub.bridge(body, BridgeConfig::default());

    let nodes = bridge.list_nodes(DOC_A).wait().unwrap();
    assert_eq!(
        nodes,
        vec!["/obj", "/obj/geo1", "/obj/geo1/box1", "/obj/cam1", "/out", "/out/mantra1"]
    );
    assert_eq!(stub.leftover_scripts(), 0);
}

#[cfg(unix)]
#[test]
fn test_hython_empty_parameter_list() {
    let stub = Stub::new();
    let body = "echo PARAM_LIST_START\necho\necho PARAM_LIST_END\n";
    let bridge = stub.bridge(body, BridgeConfig::default());

    let parms = bridge.list_parameters(DOC_A, "/obj/missing").wait().unwrap();
    assert!(parms.is_empty());
}

#[cfg(unix)]
#[test]
fn test_hython_non_zero_exit_for_every_operation() {
    let stub = Stub::new();
    let body = "printf 'Traceback (most recent call last):\\n  File \"x.py\"\\nAttributeError: NoneType\\n' >&2\n\
                exit 1\n";
    let bridge = stub.bridge(body, BridgeConfig::default());
    let expected = "Traceback (most recent call last):\n  File \"x.py\"\nAttributeError: NoneType\n";

    let results = vec![
        bridge.list_nodes(DOC_A).wait().map(|_| ()),
        bridge.list_parameters(DOC_A, "/obj/geo1").wait().map(|_| ()),
        bridge.get_parameter_value(DOC_A, "/obj/geo1", "tx").wait().map(|_| ()),
        bridge.set_parameter_value(DOC_A, "/obj/geo1", "tx", "1").wait(),
    ];

    for result in results {
        match result {
            Err(BridgeError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, 1);
                assert_eq!(stderr, expected);
            }
            other => panic!("Expected NonZeroExit, got {:?}", other),
        }
    }
    assert_eq!(stub.leftover_scripts(), 0);
    assert_eq!(stub.registry.active_count(), 0);
}

#[cfg(unix)]
#[test]
fn test_hython_set_on_absent_parameter_succeeds() {
    let stub = Stub::new();
    // Interpreter ignores the set and exits cleanly
    let bridge = stub.bridge("exit 0\n", BridgeConfig::default());

    bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "no_such_parm", "5")
        .wait()
        .unwrap();
}

#[cfg(unix)]
#[test]
fn test_hython_error_policy_reports_exit_code() {
    let stub = Stub::new();
    // Runs the error branch the generated script takes for a missing parameter
    let body = "grep -q 'sys.exit(3)' \"$1\" || exit 0\n\
                echo 'No parameter nope on /obj/geo1' >&2\n\
                exit 3\n";
    let config = BridgeConfig {
        missing_parameter: MissingParameterPolicy::Error,
        ..Default::default()
    };
    let bridge = stub.bridge(body, config);

    let err = bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "nope", "1")
        .wait()
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::NonZeroExit { code: MISSING_PARAMETER_EXIT_CODE, .. }
    ));
}

#[cfg(unix)]
#[test]
fn test_hython_fractional_int_is_rejected_not_truncated() {
    let stub = Stub::new();
    // Takes the reject branch when the script checks for integral input
    let body = "grep -q 'is_integer' \"$1\" || exit 0\n\
                echo \"Not an integer value: '2.7'\" >&2\n\
                exit 4\n";
    let bridge = stub.bridge(body, BridgeConfig::default());

    let err = bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "divisions", "2.7")
        .wait()
        .unwrap_err();
    match err {
        BridgeError::NonZeroExit { code, stderr } => {
            assert_eq!(code, INVALID_VALUE_EXIT_CODE);
            assert_eq!(stderr, "Not an integer value: '2.7'\n");
        }
        other => panic!("expected NonZeroExit, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_hython_missing_markers_degrade_by_default() {
    let stub = Stub::new();
    let bridge = stub.bridge("echo 'no blocks here'\n", BridgeConfig::default());

    assert!(bridge.list_nodes(DOC_A).wait().unwrap().is_empty());
    assert!(bridge
        .list_parameters(DOC_A, "/obj/geo1")
        .wait()
        .unwrap()
        .is_empty());
    assert_eq!(
        bridge
            .get_parameter_value(DOC_A, "/obj/geo1", "tx")
            .wait()
            .unwrap(),
        ParameterReading::Unavailable
    );
}

#[cfg(unix)]
#[test]
fn test_hython_missing_markers_fail_in_strict_mode() {
    let stub = Stub::new();
    let bridge = stub.bridge("echo NODE_LIST_START\necho /obj\n", strict());

    let err = bridge.list_nodes(DOC_A).wait().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::MalformedOutput {
            operation: "listNodes",
            marker: "NODE_LIST_END"
        }
    ));

    let err = bridge
        .get_parameter_value(DOC_A, "/obj/geo1", "tx")
        .wait()
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::MalformedOutput {
            marker: "PARM_VALUE_START",
            ..
        }
    ));
}

#[cfg(unix)]
#[test]
fn test_hython_set_then_get_round_trip() {
    let stub = Stub::new();
    // Saves read the `text = '...'` line of the set script; reads echo it back
    let body = "state=\"$(dirname \"$1\")/state.txt\"\n\
                if grep -q 'hipFile.save' \"$1\"; then\n\
                  sed -n \"s/^text = '\\(.*\\)'$/\\1/p\" \"$1\" > \"$state\"\n\
                else\n\
                  echo PARM_VALUE_START\n\
                  cat \"$state\" 2>/dev/null\n\
                  echo PARM_VALUE_END\n\
                fi\n";
    let bridge = stub.bridge(body, BridgeConfig::default());

    bridge
        .set_parameter_value(DOC_A, "/obj/geo1", "tx", "3.25")
        .wait()
        .unwrap();
    let reading = bridge
        .get_parameter_value(DOC_A, "/obj/geo1", "tx")
        .wait()
        .unwrap();
    assert_eq!(reading, ParameterReading::Value("3.25".to_string()));
}

#[cfg(unix)]
#[test]
fn test_hython_timeout_kills_interpreter() {
    let stub = Stub::new();
    let body = "echo $$ > \"$(dirname \"$1\")/pid.txt\"\nexec sleep 30\n";
    let config = BridgeConfig {
        timeout_ms: 300,
        ..Default::default()
    };
    let bridge = stub.bridge(body, config);

    let start = std::time::Instant::now();
    let err = bridge.list_nodes(DOC_A).wait().unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }), "got {:?}", err);
    assert!(start.elapsed() < Duration::from_secs(10));

    let pid: u32 = fs::read_to_string(stub.dir.path().join("pid.txt"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(!is_process_running(pid));
    assert_eq!(stub.leftover_scripts(), 0);
}

#[cfg(unix)]
#[test]
fn test_hython_cancel_running_call() {
    let stub = Stub::new();
    let body = "echo $$ > \"$(dirname \"$1\")/pid.txt\"\nexec sleep 30\n";
    let bridge = stub.bridge(body, BridgeConfig::default());
    let pid_file = stub.dir.path().join("pid.txt");

    let call = bridge.list_nodes(DOC_A);
    let start = std::time::Instant::now();
    while !pid_file.exists() && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(10));
    }
    call.cancel();

    assert!(matches!(call.wait(), Err(BridgeError::Cancelled)));
    let pid: u32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    assert!(!is_process_running(pid));
    assert_eq!(stub.registry.active_count(), 0);
}

#[test]
fn test_from_config_with_missing_interpreter_fails_at_call_time() {
    let config = Config {
        paths: crate::config::AppPaths {
            hython: Some("/definitely/not/here/hython".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let bridge = NodeBridge::from_config(&config).unwrap();
    assert_eq!(
        bridge.transport().interpreter(),
        Path::new("/definitely/not/here/hython")
    );

    let err = bridge.list_nodes(DOC_A).wait().unwrap_err();
    assert!(matches!(err, BridgeError::Spawn { .. }), "got {:?}", err);
}
