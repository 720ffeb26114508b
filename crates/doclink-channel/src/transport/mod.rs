//! The persistent-connection primitive the channel runs on.
//!
//! A [`Transport`] opens links; a [`TransportLink`] is one open connection,
//! expressed as a pair of queues. The channel never touches sockets directly,
//! so tests swap in a scripted transport.

use async_trait::async_trait;
use doclink_core::TransportError;
use tokio::sync::mpsc;

pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

pub use websocket::WebSocketTransport;

/// Capacity of the outbound queue of a link. Sends beyond it are dropped.
pub const OUTBOUND_CAPACITY: usize = 64;
/// Capacity of the inbound queue of a link.
pub const INBOUND_CAPACITY: usize = 256;

/// A frame for the far end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// Close the connection gracefully.
    Close,
}

/// Something the far end did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The link hit an error. It is followed by the end of the stream.
    Error(String),
    /// The peer closed the link.
    Closed,
}

/// One open connection.
///
/// When `inbound` yields `None`, the link is gone, exactly as if
/// [`TransportEvent::Closed`] had been received.
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to write.
    pub outbound: mpsc::Sender<Outbound>,
    /// Frames and lifecycle notifications read.
    pub inbound: mpsc::Receiver<TransportEvent>,
}

impl TransportLink {
    /// A link plus the far ends of both queues.
    pub fn pair() -> (Self, mpsc::Receiver<Outbound>, mpsc::Sender<TransportEvent>) {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let link = Self {
            outbound: out_tx,
            inbound: in_rx,
        };
        (link, out_rx, in_tx)
    }
}

/// Opens links to an endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new link to `url`. Each call is a new physical connection.
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError>;
}
