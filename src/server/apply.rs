//! Apply serialization: at most one configuration in flight.
//!
//! Validated candidates pass through here in FIFO order. While one apply
//! waits for the router's verdict, later candidates queue; nothing else
//! in the controller ever exchanges the store. On `OK` the candidate
//! becomes the current tree; on anything else it is dropped whole and
//! the current tree stays untouched.

use crate::{
    conf::store::ConfStore,
    errors::ErrorKind,
    http::response::Response,
    server::router::RouterPort,
};
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A validated candidate waiting for its turn and its verdict.
#[derive(Debug)]
pub(crate) struct PendingApply {
    pub(crate) candidate: Value,
    pub(crate) reply: oneshot::Sender<Response>,
}

pub(crate) struct ApplyQueue {
    current: Option<PendingApply>,
    waiting: VecDeque<PendingApply>,
}

impl ApplyQueue {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            current: None,
            waiting: VecDeque::new(),
        }
    }

    /// Hands a candidate to the serializer. While an apply is in flight
    /// the request queues without router traffic; otherwise its tree is
    /// encoded and sent as a single `DATA` message. A transport failure
    /// returns the request to the caller.
    pub(crate) fn submit(
        &mut self,
        port: &mut dyn RouterPort,
        request: PendingApply,
    ) -> Result<(), PendingApply> {
        if self.current.is_some() {
            self.waiting.push_back(request);
            return Ok(());
        }

        let payload = match serde_json::to_vec(&request.candidate) {
            Ok(payload) => payload,
            Err(_) => return Err(request),
        };

        debug!("conf pass: {} bytes", payload.len());

        if port.send_data(payload).is_err() {
            return Err(request);
        }

        self.current = Some(request);
        Ok(())
    }

    /// Consumes the router's verdict for the in-flight apply, then
    /// drains the waiting list up to the next successful submission.
    pub(crate) fn on_reply(
        &mut self,
        store: &mut ConfStore,
        port: &mut dyn RouterPort,
        payload: &[u8],
    ) {
        let Some(request) = self.current.take() else {
            warn!("router reply without an apply in flight");
            return;
        };

        let response = if payload == b"OK" {
            store.swap(request.candidate);
            Some(Response::reconfiguration_done())
        } else {
            // the candidate is dropped whole; current stays as it was
            Response::from_error(&ErrorKind::ApplyRejected)
        };

        // the originating connection may already be gone
        if let Some(response) = response {
            let _ = request.reply.send(response);
        }

        while let Some(waiting) = self.waiting.pop_front() {
            match self.submit(port, waiting) {
                Ok(()) => break,
                Err(failed) => {
                    if let Some(response) = Response::from_error(&ErrorKind::ResourceExhausted) {
                        let _ = failed.reply.send(response);
                    }
                }
            }
        }
    }
}
