//! Shared error hierarchy.
//!
//! Client-visible failures collapse to either a close frame (handshake
//! level) or an in-band `error`/`phx_reply` with `status: "error"`;
//! internal details stay in logs. The `Display` strings here are the
//! close-frame reasons clients see.

use thiserror::Error;

/// Handshake failures, terminal for the connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The handshake was missing one of the four required parameters.
    #[error("missing parameters: {missing}")]
    MissingParameters {
        /// Comma-separated names of the absent parameters.
        missing: String,
    },
    /// The authority denied the connection. Deliberately generic:
    /// upstream detail never reaches the client.
    #[error("authentication failed")]
    AuthenticationFailed,
}
