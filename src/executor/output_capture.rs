//! Pipe capture for interpreter stdout/stderr
//!
//! Each pipe gets its own reader thread that tees every line to the logging
//! system while keeping the exact bytes for the caller. Reading both pipes
//! concurrently keeps a chatty interpreter from blocking on a full pipe.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Which pipe a capture is attached to (for log fields)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Capture handle containing the shared byte buffer and the reader thread.
///
/// The buffer is shared so a partial capture can still be returned when the
/// reader thread does not finish in time (e.g. a grandchild kept the pipe open).
#[derive(Debug)]
pub struct OutputCapture {
    bytes: Arc<Mutex<Vec<u8>>>,
    join_handle: JoinHandle<()>,
}

impl OutputCapture {
    /// Wait for the reader thread to hit end-of-pipe, with timeout
    ///
    /// Returns true if the thread completed within the timeout.
    pub fn wait_with_timeout(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(5);

        while start.elapsed() < timeout {
            if self.join_handle.is_finished() {
                return true;
            }
            thread::sleep(poll_interval);
        }

        self.join_handle.is_finished()
    }

    /// Captured text after waiting up to `timeout` for the reader to finish.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn into_text(self, timeout: Duration) -> String {
        if !self.wait_with_timeout(timeout) {
            warn!(target: "HYTHON", "output reader still running, returning partial capture");
        }
        let bytes = self.bytes.lock();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Spawn a reader thread that tees a child pipe to logging and a buffer.
pub fn spawn_output_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: Stream,
    label: String,
) -> OutputCapture {
    let bytes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&bytes);

    let join_handle = thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    debug!(
                        target: "HYTHON",
                        stream = stream.as_str(),
                        script = %label,
                        "{}",
                        String::from_utf8_lossy(&line).trim_end()
                    );
                    sink.lock().extend_from_slice(&line);
                }
                Err(e) => {
                    warn!(target: "HYTHON", stream = stream.as_str(), error = %e, "pipe read error");
                    break;
                }
            }
        }
        debug!(target: "HYTHON", stream = stream.as_str(), "reader exiting");
    });

    OutputCapture { bytes, join_handle }
}
