//! Settings loading: defaults, file layer, env overrides.
//!
//! The three layers in priority order:
//! 1. Compiled defaults — [`RelaySettings::default()`]
//! 2. JSON file — [`settings_path`], deep-merged over defaults
//! 3. `RELAY_*` environment variables (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Resolve the settings file path.
///
/// `RELAY_SETTINGS_PATH` wins when set; otherwise `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Ok(path) = std::env::var("RELAY_SETTINGS_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".relay").join("settings.json")
}

/// Deep-merge `overlay` into `base`.
///
/// Objects merge recursively; any other value in `overlay` replaces the
/// `base` value wholesale.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings using the default path; a missing file is not an error.
pub fn load_settings() -> Result<RelaySettings> {
    let path = settings_path();
    if path.exists() {
        load_settings_from_path(&path)
    } else {
        let mut settings = RelaySettings::default();
        apply_env_overrides(&mut settings);
        settings.validate();
        Ok(settings)
    }
}

/// Load settings from a specific file, deep-merged over defaults, with
/// env overrides applied last.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let file_value: Value = serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
        reason: e.to_string(),
    })?;

    let defaults = serde_json::to_value(RelaySettings::default()).map_err(|e| {
        SettingsError::Parse {
            reason: e.to_string(),
        }
    })?;
    let merged = deep_merge(defaults, file_value);

    let mut settings: RelaySettings =
        serde_json::from_value(merged).map_err(|e| SettingsError::Parse {
            reason: e.to_string(),
        })?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Apply `RELAY_*` environment variable overrides.
fn apply_env_overrides(settings: &mut RelaySettings) {
    if let Ok(bind) = std::env::var("RELAY_BIND") {
        settings.server.bind = bind;
    }
    if let Ok(port) = std::env::var("RELAY_PORT") {
        match port.parse() {
            Ok(p) => settings.server.port = p,
            Err(_) => tracing::warn!(value = %port, "ignoring unparseable RELAY_PORT"),
        }
    }
    if let Ok(url) = std::env::var("RELAY_AUTHORITY_URL") {
        settings.authority.base_url = url;
    }
    if let Ok(url) = std::env::var("RELAY_DATABASE_URL") {
        settings.database.url = Some(url);
    }
    if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
        settings.logging.level = level;
    }
    if let Ok(json) = std::env::var("RELAY_LOG_JSON") {
        settings.logging.json = json == "1" || json.eq_ignore_ascii_case("true");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
