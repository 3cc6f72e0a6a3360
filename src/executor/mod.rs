//! Interpreter execution module
//!
//! This module handles running generated scripts in the external interpreter:
//! - Transient script files that never outlive a call
//! - One child process per call, in its own process group
//! - Concurrent stdout/stderr capture
//! - Timeout and cancellation that kill the process tree, not just the wait

mod output_capture;
mod runner;

pub use output_capture::{spawn_output_reader, OutputCapture, Stream};
pub use runner::{kill_process_tree, CancelToken, RunOutput, ScriptRunner};
