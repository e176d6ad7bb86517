//! The transport seam between the controller and the router process.
//!
//! The controller sees the data plane as two halves: an outbound
//! [`RouterPort`] that accepts one framed `DATA` message per apply, and
//! an inbound reply stream. The router must answer every message exactly
//! once, in order: the two bytes `OK` accept the configuration, anything
//! else rejects it.

use std::{error, fmt};
use tokio::sync::mpsc;

/// Outbound half of the router transport.
///
/// `send_data` must not block: it either enqueues the message or fails
/// immediately. A failure is surfaced to the client as
/// `500 Memory allocation failed.` and never leaves a half-sent apply
/// behind.
pub trait RouterPort: Send + 'static {
    /// Enqueues one `DATA` message holding a JSON-encoded configuration
    /// tree.
    fn send_data(&mut self, payload: Vec<u8>) -> Result<(), PortSendError>;
}

/// The router transport refused an outbound message.
#[derive(Debug, PartialEq)]
pub struct PortSendError;

impl error::Error for PortSendError {}
impl fmt::Display for PortSendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("router port send failed")
    }
}

/// [`RouterPort`] over an in-process tokio channel.
pub struct ChannelRouterPort {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelRouterPort {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl RouterPort for ChannelRouterPort {
    fn send_data(&mut self, payload: Vec<u8>) -> Result<(), PortSendError> {
        self.tx.send(payload).map_err(|_| PortSendError)
    }
}

/// The controller-side view of the router transport: the outbound port
/// plus the ordered reply stream.
pub struct RouterLink {
    pub(crate) port: Box<dyn RouterPort>,
    pub(crate) replies: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl RouterLink {
    pub fn new<P: RouterPort>(port: P, replies: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            port: Box::new(port),
            replies,
        }
    }
}

/// The router-side handle produced by [`pair`]: configuration payloads
/// arrive on `data`, verdicts go back through `replies`.
pub struct RouterHandle {
    pub data: mpsc::UnboundedReceiver<Vec<u8>>,
    pub replies: mpsc::UnboundedSender<Vec<u8>>,
}

/// Builds an in-process transport pair. The [`RouterLink`] goes to the
/// [`Controller`](crate::Controller); the [`RouterHandle`] goes to
/// whatever bridges the process that owns the data plane.
pub fn pair() -> (RouterLink, RouterHandle) {
    let (data_tx, data_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    (
        RouterLink::new(ChannelRouterPort::new(data_tx), reply_rx),
        RouterHandle {
            data: data_rx,
            replies: reply_tx,
        },
    )
}

#[cfg(test)]
mod transport {
    use super::*;

    #[tokio::test]
    async fn pair_carries_data_and_replies() {
        let (mut link, mut handle) = pair();

        link.port.send_data(b"{}".to_vec()).unwrap();
        assert_eq!(handle.data.recv().await.unwrap(), b"{}");

        handle.replies.send(b"OK".to_vec()).unwrap();
        assert_eq!(link.replies.recv().await.unwrap(), b"OK");
    }

    #[tokio::test]
    async fn closed_router_fails_sends() {
        let (mut link, handle) = pair();
        drop(handle);

        assert_eq!(link.port.send_data(b"{}".to_vec()), Err(PortSendError));
    }
}
