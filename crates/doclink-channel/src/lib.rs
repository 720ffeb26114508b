//! # doclink-channel
//!
//! A long-lived client connection that receives document processing events
//! pushed by a server and fans them out to subscribers:
//!
//! - [`EventChannel`]: one physical connection, lazy connect on first
//!   subscribe, reconnect with exponential backoff, best-effort send
//! - [`registry`]: document-scoped and global subscribers, panic-isolated
//!   dispatch
//! - [`state`]: the connection lifecycle as a pure state machine
//! - [`transport`]: the connection primitive, with a WebSocket implementation
//! - [`reconcile`]: optional polling to recover events missed while offline
//!
//! ```ignore
//! let channel = EventChannel::from_settings(&settings.channel);
//! let sub = channel.subscribe_to_document("doc-1", |event: &DocumentEvent| {
//!     println!("{} {:?}", event.kind, event.progress);
//! });
//! // ...
//! sub.cancel();
//! channel.disconnect();
//! ```

#![deny(unsafe_code)]

pub mod channel;
pub mod reconcile;
pub mod registry;
pub mod state;
pub mod transport;

pub use channel::{ChannelConfig, EventChannel};
pub use reconcile::{Reconciler, SourceError, StatusSource};
pub use registry::{Scope, Subscriber, Subscription, SubscriptionId};
pub use state::ConnectionState;
pub use transport::{Outbound, Transport, TransportEvent, TransportLink, WebSocketTransport};
