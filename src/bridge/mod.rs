//! Node bridge
//!
//! Orchestrates the four node/parameter operations over a pluggable
//! [`Transport`]. Every call is queued on a worker lane owned by its document
//! path:
//! - calls against the same document run one at a time, in submission order
//! - calls against different documents run concurrently
//! - callers get a [`PendingCall`] back immediately and never block on the
//!   interpreter unless they choose to wait
//!
//! A lane thread exits once its queue drains and is started again by the
//! next call for that document.

mod pending;
mod types;

pub use pending::PendingCall;
pub use types::{FromResponse, ParameterReading, Request, Response, Transport};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{BridgeError, Result};
pub use crate::executor::CancelToken;
use crate::hython::HythonTransport;
use crate::logging;

/// Calls slower than this are flagged in the perf log
const SLOW_CALL_THRESHOLD_MS: u64 = 10_000;

struct Job {
    request: Request,
    cancel: CancelToken,
    reply: Sender<Result<Response>>,
}

struct Lane {
    id: u64,
    sender: Sender<Job>,
}

type Lanes = Arc<Mutex<HashMap<PathBuf, Lane>>>;

pub struct NodeBridge<T: Transport> {
    transport: Arc<T>,
    lanes: Lanes,
    next_lane_id: AtomicU64,
    last_document: Mutex<Option<PathBuf>>,
}

impl NodeBridge<HythonTransport> {
    /// Build a bridge backed by hython, resolving the interpreter once.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(HythonTransport::from_config(config)?))
    }
}

impl<T: Transport> NodeBridge<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            lanes: Arc::new(Mutex::new(HashMap::new())),
            next_lane_id: AtomicU64::new(0),
            last_document: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Document path of the most recently submitted call
    pub fn last_document(&self) -> Option<PathBuf> {
        self.last_document.lock().clone()
    }

    pub fn list_nodes(&self, document: impl Into<PathBuf>) -> PendingCall<Vec<String>> {
        self.submit(Request::ListNodes {
            document: document.into(),
        })
    }

    /// An unresolvable node yields an empty list, not an error.
    pub fn list_parameters(
        &self,
        document: impl Into<PathBuf>,
        node: impl Into<String>,
    ) -> PendingCall<Vec<String>> {
        self.submit(Request::ListParameters {
            document: document.into(),
            node: node.into(),
        })
    }

    /// A missing node or parameter fails the call with a non-zero exit.
    pub fn get_parameter_value(
        &self,
        document: impl Into<PathBuf>,
        node: impl Into<String>,
        parameter: impl Into<String>,
    ) -> PendingCall<ParameterReading> {
        self.submit(Request::GetParameterValue {
            document: document.into(),
            node: node.into(),
            parameter: parameter.into(),
        })
    }

    /// Set a parameter and save the document in place.
    ///
    /// Overwrites the file on disk every time; never call speculatively.
    pub fn set_parameter_value(
        &self,
        document: impl Into<PathBuf>,
        node: impl Into<String>,
        parameter: impl Into<String>,
        value: impl Into<String>,
    ) -> PendingCall<()> {
        self.submit(Request::SetParameterValue {
            document: document.into(),
            node: node.into(),
            parameter: parameter.into(),
            value: value.into(),
        })
    }

    /// Queue a request on its document's lane.
    pub fn submit<R: FromResponse>(&self, request: Request) -> PendingCall<R> {
        let operation = request.operation();
        let document = request.document().to_path_buf();
        let cancel = CancelToken::new();
        let (reply, receiver) = async_channel::bounded(1);

        *self.last_document.lock() = Some(document.clone());

        let job = Job {
            request,
            cancel: cancel.clone(),
            reply,
        };
        if let Err(job) = self.enqueue(&document, job) {
            warn!(document = %document.display(), operation, "No worker lane available");
            let _ = job.reply.try_send(Err(BridgeError::Disconnected));
        }

        PendingCall::new(operation, receiver, cancel)
    }

    /// Number of documents with a running worker lane
    pub fn lane_count(&self) -> usize {
        self.lanes.lock().len()
    }

    fn enqueue(&self, document: &Path, job: Job) -> std::result::Result<(), Job> {
        let mut lanes = self.lanes.lock();

        let job = match lanes.get(document) {
            Some(lane) => match lane.sender.try_send(job) {
                Ok(()) => return Ok(()),
                // Lane thread is gone; replace it below
                Err(e) => e.into_inner(),
            },
            None => job,
        };

        // Queued while the lock is held; a lane that finds its queue empty rechecks under it
        let Some(lane) = self.spawn_lane(document) else {
            lanes.remove(document);
            return Err(job);
        };
        let result = lane.sender.try_send(job).map_err(|e| e.into_inner());
        lanes.insert(document.to_path_buf(), lane);
        result
    }

    fn spawn_lane(&self, document: &Path) -> Option<Lane> {
        let (sender, receiver) = async_channel::unbounded::<Job>();
        let id = self.next_lane_id.fetch_add(1, Ordering::Relaxed);
        let transport = Arc::clone(&self.transport);
        let lanes = Arc::clone(&self.lanes);
        let owner = document.to_path_buf();
        let name = format!("bridge-lane:{}", document.display());

        match std::thread::Builder::new()
            .name(name)
            .spawn(move || run_lane(transport, lanes, owner, id, receiver))
        {
            Ok(_) => {
                debug!(document = %document.display(), lane = id, "Worker lane started");
                Some(Lane { id, sender })
            }
            Err(e) => {
                warn!(document = %document.display(), error = %e, "Failed to start worker lane");
                None
            }
        }
    }
}

impl<T: Transport> Drop for NodeBridge<T> {
    fn drop(&mut self) {
        // Closing the senders lets each lane finish its queue and exit
        self.lanes.lock().clear();
    }
}

/// Worker loop for one document: run queued jobs in order until the queue
/// drains or the bridge drops
fn run_lane<T: Transport>(
    transport: Arc<T>,
    lanes: Lanes,
    document: PathBuf,
    id: u64,
    jobs: Receiver<Job>,
) {
    loop {
        let job = match jobs.try_recv() {
            Ok(job) => job,
            Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Empty) => {
                // Jobs are only sent while this lock is held, so an empty
                // queue seen here stays empty once the lane is unlisted
                let mut lanes = lanes.lock();
                if !jobs.is_empty() {
                    continue;
                }
                if lanes.get(&document).is_some_and(|lane| lane.id == id) {
                    lanes.remove(&document);
                }
                break;
            }
        };
        let operation = job.request.operation();
        let label = job.request.document().display().to_string();

        if job.cancel.is_cancelled() {
            info!(operation, document = %label, "Skipping call cancelled while queued");
            let _ = job.reply.send_blocking(Err(BridgeError::Cancelled));
            continue;
        }

        let start = Instant::now();
        let result = transport.call(&job.request, &job.cancel);
        let duration_ms = start.elapsed().as_millis() as u64;

        logging::log_bridge_event(operation, &label, duration_ms, result.is_ok());
        logging::log_perf(operation, duration_ms, SLOW_CALL_THRESHOLD_MS);
        if let Err(e) = &result {
            warn!(operation, document = %label, error = %e, "Bridge call failed");
        }

        // The caller may have dropped its handle; the work is done either way
        let _ = job.reply.send_blocking(result);
    }
    debug!(document = %document.display(), lane = id, "Worker lane stopped");
}

#[cfg(test)]
#[path = "../bridge_tests.rs"]
mod tests;
