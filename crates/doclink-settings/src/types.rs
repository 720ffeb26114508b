//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it overrides.

use doclink_core::ReconnectConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings.
///
/// ```json
/// {
///   "channel": { "url": "wss://pipeline.example.com/ws", "reconnect": { "maxAttempts": 8 } },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoclinkSettings {
    /// Push-channel connection settings.
    pub channel: ChannelSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Periodic status reconciliation.
    pub reconcile: ReconcileSettings,
}

impl DoclinkSettings {
    /// Reject values the channel cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.channel.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("channel.url is empty".into()));
        }
        if !(self.channel.url.starts_with("ws://") || self.channel.url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "channel.url must use ws:// or wss://, got {}",
                self.channel.url
            )));
        }
        if self.channel.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "channel.connectTimeoutMs must be positive".into(),
            ));
        }
        if self.channel.reconnect.base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "channel.reconnect.baseDelayMs must be positive".into(),
            ));
        }
        if self.reconcile.enabled && self.reconcile.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "reconcile.intervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Push-channel connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Base WebSocket URL of the backend.
    pub url: String,
    /// Path of the document event stream, appended to `url`.
    pub path: String,
    /// How long an open handshake may take, in ms.
    pub connect_timeout_ms: u64,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            path: "/documents".to_string(),
            connect_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ChannelSettings {
    /// Full endpoint: `url` joined with `path`, with exactly one slash between.
    pub fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive (e.g. `info`, `doclink_channel=debug`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Periodic status reconciliation for documents still processing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileSettings {
    /// Whether to poll at all.
    pub enabled: bool,
    /// Poll interval in ms.
    pub interval_ms: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 5_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
