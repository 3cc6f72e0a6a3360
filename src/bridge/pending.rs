//! Handle to a bridge call that is queued or running on a worker lane

use std::marker::PhantomData;

use async_channel::{Receiver, TryRecvError};

use super::types::{FromResponse, Response};
use crate::error::{BridgeError, Result};
use crate::executor::CancelToken;

/// A submitted bridge call.
///
/// The result can be awaited from async code ([`PendingCall::recv`]), waited
/// on from a plain thread ([`PendingCall::wait`]) or polled from an event loop
/// ([`PendingCall::try_result`]). Dropping the handle does not cancel the call.
#[derive(Debug)]
pub struct PendingCall<R> {
    operation: &'static str,
    receiver: Receiver<Result<Response>>,
    cancel: CancelToken,
    _result: PhantomData<fn() -> R>,
}

impl<R: FromResponse> PendingCall<R> {
    pub(crate) fn new(
        operation: &'static str,
        receiver: Receiver<Result<Response>>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            operation,
            receiver,
            cancel,
            _result: PhantomData,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Cancel the call. A queued call is skipped; a running one has its
    /// interpreter killed. Either way the result is [`BridgeError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block the current thread until the call finishes
    pub fn wait(self) -> Result<R> {
        let reply = self
            .receiver
            .recv_blocking()
            .map_err(|_| BridgeError::Disconnected)?;
        self.decode(reply)
    }

    /// Await the call from async code
    pub async fn recv(self) -> Result<R> {
        let reply = self
            .receiver
            .recv()
            .await
            .map_err(|_| BridgeError::Disconnected)?;
        self.decode(reply)
    }

    /// Non-blocking poll; `None` while the call is still queued or running.
    ///
    /// Once this returns `Some`, later polls report [`BridgeError::Disconnected`].
    pub fn try_result(&self) -> Option<Result<R>> {
        match self.receiver.try_recv() {
            Ok(reply) => Some(self.decode(reply)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(BridgeError::Disconnected)),
        }
    }

    fn decode(&self, reply: Result<Response>) -> Result<R> {
        reply.and_then(|response| R::from_response(response, self.operation))
    }
}
