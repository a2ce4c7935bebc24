//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! settings file. Each type implements [`Default`] with production
//! default values; `#[serde(default)]` allows partial JSON — missing
//! fields get their default during deserialization.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root settings type for the Relay gateway.
///
/// Loaded from `~/.relay/settings.json` with defaults applied for
/// missing fields. `RELAY_*` environment variables override specific
/// values after the file layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Settings schema version.
    pub version: String,
    /// Server network settings.
    pub server: ServerSettings,
    /// Heartbeat liveness settings.
    pub heartbeat: HeartbeatSettings,
    /// External-state cleanup settings.
    pub cleanup: CleanupSettings,
    /// Authorization authority settings.
    pub authority: AuthoritySettings,
    /// Database / notification channel settings.
    pub database: DatabaseSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            cleanup: CleanupSettings::default(),
            authority: AuthoritySettings::default(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RelaySettings {
    /// Correct invalid invariants in place.
    ///
    /// Called automatically during loading. Out-of-range values are
    /// corrected with a warning rather than rejected, so operators get
    /// working behavior instead of a confusing startup error.
    pub fn validate(&mut self) {
        let hb = &mut self.heartbeat;
        if hb.timeout_secs <= hb.interval_secs {
            let corrected = hb.interval_secs * 2;
            tracing::warn!(
                "heartbeat timeoutSecs ({}) <= intervalSecs ({}), correcting to {corrected}",
                hb.timeout_secs,
                hb.interval_secs
            );
            hb.timeout_secs = corrected;
        }
        if self.authority.timeout_secs == 0 {
            tracing::warn!("authority timeoutSecs of 0 would fail every call, correcting to 5");
            self.authority.timeout_secs = 5;
        }
        if self.server.outbound_buffer == 0 {
            tracing::warn!("server outboundBuffer of 0 drops every frame, correcting to 256");
            self.server.outbound_buffer = 256;
        }
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound per-connection channel capacity (frames).
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 4100,
            max_message_size: 1024 * 1024,
            outbound_buffer: 256,
        }
    }
}

/// Heartbeat liveness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Sweep interval in seconds.
    pub interval_secs: u64,
    /// Silence threshold in seconds before a connection is force-closed.
    pub timeout_secs: u64,
}

impl HeartbeatSettings {
    /// Sweep interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Timeout threshold as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 60,
        }
    }
}

/// External-state cleanup settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupSettings {
    /// Cleanup interval in seconds.
    pub interval_secs: u64,
    /// Mirror rows with a heartbeat older than this are purged (seconds).
    pub retention_secs: u64,
}

impl CleanupSettings {
    /// Cleanup interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            retention_secs: 900,
        }
    }
}

/// Authorization authority settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthoritySettings {
    /// Base URL of the external authority.
    pub base_url: String,
    /// Per-call timeout in seconds. Timeouts are treated as denials.
    pub timeout_secs: u64,
}

impl AuthoritySettings {
    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Database / notification channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Postgres connection URL. When unset the change listener and the
    /// durable mirror are disabled (gateway still serves client
    /// broadcasts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// NOTIFY channel carrying per-row change events.
    pub changes_channel: String,
    /// NOTIFY channel carrying explicit application broadcasts.
    pub broadcast_channel: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            changes_channel: "realtime_changes".to_string(),
            broadcast_channel: "realtime_broadcast".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter directive.
    pub level: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
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

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
