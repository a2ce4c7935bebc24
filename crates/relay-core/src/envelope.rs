//! Wire message envelope.
//!
//! Every frame in either direction is one JSON envelope:
//! `{ "event": string, "topic": string|null, "payload": object, "ref": string|null }`.
//!
//! Recognized client events are `heartbeat`, `phx_join`, `phx_leave`,
//! `broadcast` and `presence_update`; the server answers with `phx_reply`
//! (payload `{ "status": "ok"|"error", "response": {...} }`) or an
//! `error` envelope, and pushes change events tagged with their topic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Close codes sent in WebSocket close frames.
pub mod close_code {
    /// Policy violation: missing handshake parameters or authentication
    /// denial. RFC 6455 reserved code.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Application close code for a heartbeat-timeout disconnect.
    pub const HEARTBEAT_TIMEOUT: u16 = 4000;
}

/// Client-to-server event names.
pub mod events {
    /// Liveness signal; replied with the same `ref`.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Subscribe to a topic.
    pub const JOIN: &str = "phx_join";
    /// Unsubscribe from a topic (idempotent).
    pub const LEAVE: &str = "phx_leave";
    /// Client-originated message for other subscribers of a topic.
    pub const BROADCAST: &str = "broadcast";
    /// Presence change, routed like a broadcast.
    pub const PRESENCE_UPDATE: &str = "presence_update";
    /// Server-to-client acknowledgement.
    pub const REPLY: &str = "phx_reply";
    /// Server-to-client error not tied to a reply slot.
    pub const ERROR: &str = "error";
}

/// One wire frame, in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name (see [`events`]).
    pub event: String,
    /// Topic the frame addresses, when applicable.
    #[serde(default)]
    pub topic: Option<String>,
    /// Event-specific body.
    #[serde(default)]
    pub payload: Value,
    /// Client correlation reference, echoed in replies.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// Status carried in a `phx_reply` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Request applied.
    Ok,
    /// Request denied or failed; no state was changed.
    Error,
}

impl Envelope {
    /// Build a `phx_reply` acknowledging a client request.
    pub fn reply(
        topic: Option<String>,
        reference: Option<String>,
        status: ReplyStatus,
        response: Value,
    ) -> Self {
        Self {
            event: events::REPLY.to_string(),
            topic,
            payload: serde_json::json!({ "status": status, "response": response }),
            reference,
        }
    }

    /// Build an `error` envelope correlated to the original request when
    /// a `ref` could be parsed out of it.
    pub fn error(reference: Option<String>, reason: &str) -> Self {
        Self {
            event: events::ERROR.to_string(),
            topic: None,
            payload: serde_json::json!({ "reason": reason }),
            reference,
        }
    }

    /// Build a server push carrying a fanned-out change event.
    pub fn push(topic: &str, event_type: &str, payload: Value) -> Self {
        Self {
            event: event_type.to_string(),
            topic: Some(topic.to_string()),
            payload,
            reference: None,
        }
    }
}
