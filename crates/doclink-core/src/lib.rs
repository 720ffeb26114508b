//! # doclink-core
//!
//! Foundation types shared by the doclink crates:
//!
//! - **Events**: [`DocumentEvent`] and its wire vocabulary ([`EventKind`],
//!   [`ProcessingStatus`]), plus the strict inbound decoder
//! - **Errors**: [`ChannelError`] taxonomy via `thiserror`, transport and
//!   decode errors
//! - **Retry**: reconnect backoff configuration and delay math
//! - **Logging**: `tracing` subscriber bootstrap and log-capture test helpers

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod logging;
pub mod retry;

pub use errors::{ChannelError, DecodeError, Result, TransportError};
pub use events::{DocumentEvent, EventKind, ProcessingStatus, decode_event, encode_event};
pub use retry::{ReconnectConfig, reconnect_delay};
