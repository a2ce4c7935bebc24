//! # relay-auth
//!
//! The Authorization Client: the only component permitted to make trust
//! decisions. Everything else treats its answers as authoritative and
//! final for that call.
//!
//! Three operations, behind the [`Authority`] trait so the server can
//! substitute a stub in tests:
//!
//! - [`Authority::authenticate`] — once per connection at handshake
//! - [`Authority::authorize_subscription`] — once per subscribe request
//! - [`Authority::filter_for_recipient`] — once per (event, recipient)
//!   pair during fan-out; may redact fields or veto delivery entirely
//!
//! All calls are bounded by a short timeout. Callers treat any error —
//! timeout, transport, malformed response — as a denial (fail-closed),
//! never as an implicit allow.

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod types;

pub use client::AuthorityClient;
pub use error::AuthError;
pub use types::{AuthContext, ConnectionIdentity, HandshakeCredentials};

use async_trait::async_trait;
use serde_json::Value;

/// The trust boundary: authenticates connections, approves
/// subscriptions, and filters outbound payloads per recipient.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Validate connection credentials at handshake.
    ///
    /// The returned [`ConnectionIdentity`] carries the canonical
    /// `connection_id`; the gateway must use it instead of minting one.
    async fn authenticate(
        &self,
        credentials: &HandshakeCredentials,
    ) -> Result<ConnectionIdentity, AuthError>;

    /// Validate a subscription request for `topic`.
    async fn authorize_subscription(
        &self,
        ctx: &AuthContext,
        topic: &str,
        filters: &Value,
        event_types: &[String],
    ) -> Result<bool, AuthError>;

    /// Filter an outbound payload for one recipient.
    ///
    /// `Ok(None)` vetoes delivery to that recipient; `Ok(Some(..))` may
    /// be a strict subset of the original fields.
    async fn filter_for_recipient(
        &self,
        ctx: &AuthContext,
        payload: &Value,
    ) -> Result<Option<Value>, AuthError>;
}
