//! Branded identifier newtypes.
//!
//! `ConnectionId` is authoritative and supplied by the authorization
//! step — the gateway never mints one locally, so the registry and any
//! externally persisted connection record stay correlated. `SocketId` is
//! a local-process correlator for log lines and is minted here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical connection identifier returned by the authority at handshake.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an authority-supplied identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Local-process socket correlator (uuid v7, time-ordered).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SocketId(uuid::Uuid);

impl SocketId {
    /// Mint a fresh socket id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::generate()
    }
}
