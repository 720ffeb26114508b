//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DoclinkSettings::default()`]
//! 2. If `~/.doclink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `DOCLINK_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::DoclinkSettings;

/// Resolve the path to the settings file (`~/.doclink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".doclink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DoclinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error. The result is
/// validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<DoclinkSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<DoclinkSettings> {
    let defaults = serde_json::to_value(DoclinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut DoclinkSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules; invalid values are ignored with a
/// warning and the file/default value stays in effect.
pub fn apply_overrides_from<F>(settings: &mut DoclinkSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = env.string("DOCLINK_WS_URL") {
        settings.channel.url = v;
    }
    if let Some(v) = env.string("DOCLINK_WS_PATH") {
        settings.channel.path = v;
    }
    if let Some(v) = env.u64_in("DOCLINK_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.channel.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("DOCLINK_MAX_RECONNECT_ATTEMPTS", 1, 100) {
        #[allow(clippy::cast_possible_truncation)]
        let attempts = v as u32;
        settings.channel.reconnect.max_attempts = attempts;
    }
    if let Some(v) = env.u64_in("DOCLINK_RECONNECT_BASE_DELAY_MS", 1, 600_000) {
        settings.channel.reconnect.base_delay_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("DOCLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("DOCLINK_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Reconcile ───────────────────────────────────────────────────
    if let Some(v) = env.bool("DOCLINK_RECONCILE_ENABLED") {
        settings.reconcile.enabled = v;
    }
    if let Some(v) = env.u64_in("DOCLINK_RECONCILE_INTERVAL_MS", 100, 3_600_000) {
        settings.reconcile.interval_ms = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, min, max, "invalid numeric env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
