//! # doclink-settings
//!
//! Configuration for the doclink event channel, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`DoclinkSettings::default()`]
//! 2. **User file**: `~/.doclink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DOCLINK_*` overrides (highest priority)
//!
//! There is no global singleton; callers load once and pass the value down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{ChannelSettings, DoclinkSettings, LoggingSettings, ReconcileSettings};
