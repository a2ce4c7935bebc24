//! Typed request/response records for the authority HTTP contract.
//!
//! Wire field names are snake_case per the authority's API; the one
//! irregular name is `apikey` (no underscore).

use relay_core::ids::ConnectionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four required handshake parameters from the connect query string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeCredentials {
    /// Tenant-scoped API key.
    pub api_key: String,
    /// Per-user access token.
    pub access_token: String,
    /// Tenant identifier the client claims.
    pub tenant_id: String,
    /// Project identifier the client claims.
    pub project_id: String,
}

/// Identity minted by the authority for a validated connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    /// Canonical connection id; the registry key.
    pub connection_id: ConnectionId,
    /// Authenticated user.
    pub user_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning project.
    pub project_id: String,
    /// Opaque capability set.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Credentials re-sent on subscribe and fan-out filter calls.
///
/// Cached per connection because the authority re-validates every call
/// rather than trusting a permission snapshot from handshake time.
#[derive(Clone, Debug)]
pub struct AuthContext {
    /// Canonical connection id.
    pub connection_id: ConnectionId,
    /// Cached API key from the handshake.
    pub api_key: String,
    /// Cached access token from the handshake.
    pub access_token: String,
}

/// `POST /realtime/auth` body.
#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    /// API key.
    pub apikey: &'a str,
    /// Access token.
    pub access_token: &'a str,
}

/// `POST /realtime/auth` response.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Identity on success.
    #[serde(default)]
    pub data: Option<ConnectionIdentity>,
}

/// `POST /realtime/subscribe` body.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    /// Canonical connection id.
    pub connection_id: &'a str,
    /// Topic being subscribed.
    pub channel: &'a str,
    /// Arbitrary filter payload from the client.
    pub filters: &'a Value,
    /// Event types the client wants.
    pub event_types: &'a [String],
}

/// `POST /realtime/subscribe` response.
#[derive(Debug, Deserialize)]
pub struct SubscribeResponse {
    /// Whether the subscription is allowed.
    pub success: bool,
}

/// `POST /realtime/filter` body.
#[derive(Debug, Serialize)]
pub struct FilterRequest<'a> {
    /// Recipient connection id.
    pub connection_id: &'a str,
    /// Raw event payload before per-recipient filtering.
    pub payload: &'a Value,
}

/// `POST /realtime/filter` response.
#[derive(Debug, Deserialize)]
pub struct FilterResponse {
    /// Whether filtering succeeded.
    pub success: bool,
    /// Filtered payload; `null`/absent vetoes delivery.
    #[serde(default)]
    pub data: Option<Value>,
}
