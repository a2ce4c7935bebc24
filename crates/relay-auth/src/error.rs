//! Authority call errors.
//!
//! These never reach clients verbatim; the gateway collapses every
//! variant to a generic denial and keeps the detail in logs.

use thiserror::Error;

/// Errors from an authority call. Any variant is treated as a denial by
/// callers (fail-closed).
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authority answered and said no.
    #[error("authority denied the request")]
    Denied,
    /// The call did not complete within the configured timeout.
    #[error("authority call timed out")]
    Timeout,
    /// Transport-level failure reaching the authority.
    #[error("authority transport error: {reason}")]
    Transport {
        /// Error description.
        reason: String,
    },
    /// The authority answered with a body we could not decode.
    #[error("invalid authority response: {reason}")]
    InvalidResponse {
        /// Decode error description.
        reason: String,
    },
}
