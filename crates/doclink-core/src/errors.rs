//! Error taxonomy for the event channel.
//!
//! - [`ChannelError`]: every failure the channel can observe. Only
//!   [`ChannelError::ConnectFailure`] on an explicit connect is returned to a
//!   caller; everything else is reported on the channel's side-channel and
//!   logged.
//! - [`DecodeError`]: an inbound frame did not match the wire shape.
//! - [`TransportError`]: the low-level connection primitive failed.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// ChannelError
// ─────────────────────────────────────────────────────────────────────────────

/// Failures observed by the event channel.
///
/// `Clone` so the same report can be fanned out to several observers.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ChannelError {
    /// An explicit connect attempt failed to open the transport.
    #[error("failed to connect to {url}: {reason}")]
    ConnectFailure {
        /// Endpoint that was dialed.
        url: String,
        /// Why the transport could not open.
        reason: String,
    },

    /// The reconnect policy gave up.
    #[error("reconnect abandoned after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of reconnect attempts that were made.
        attempts: u32,
    },

    /// An inbound frame was discarded.
    #[error("{0}")]
    Decode(#[from] DecodeError),

    /// A subscriber panicked while handling an event.
    #[error("subscriber for {scope} faulted: {message}")]
    SubscriberFault {
        /// Scope the subscriber was registered under.
        scope: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// An outbound payload was dropped because the channel was not connected.
    #[error("send dropped while {state}")]
    SendDropped {
        /// Connection state at the time of the send.
        state: String,
    },

    /// An outbound payload could not be serialized.
    #[error("failed to encode outbound payload: {0}")]
    Encode(String),

    /// A connect attempt was superseded by a teardown.
    #[error("connect aborted by disconnect")]
    Aborted,
}

impl ChannelError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectFailure { .. } => "CONNECT_FAILURE",
            Self::ReconnectExhausted { .. } => "RECONNECT_EXHAUSTED",
            Self::Decode(_) => "DECODE_ERROR",
            Self::SubscriberFault { .. } => "SUBSCRIBER_FAULT",
            Self::SendDropped { .. } => "SEND_DROPPED",
            Self::Encode(_) => "ENCODE_ERROR",
            Self::Aborted => "ABORTED",
        }
    }

    /// Whether the channel has stopped trying to connect on its own.
    ///
    /// Only an explicit `connect()` brings a channel back from this.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. })
    }

    /// Warnings are expected in normal operation (dropped sends).
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::SendDropped { .. })
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

// ─────────────────────────────────────────────────────────────────────────────
// DecodeError
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound frame could not be decoded into an event.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    /// Not valid JSON, or JSON of the wrong shape.
    #[error("malformed event: {0}")]
    Json(String),

    /// `progress` outside 0–100.
    #[error("progress {0} out of range 0-100")]
    ProgressOutOfRange(f64),
}

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failures of the underlying persistent-connection primitive.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be opened.
    #[error("open {url} failed: {reason}")]
    Open {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// The open handshake did not finish in time.
    #[error("open timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
