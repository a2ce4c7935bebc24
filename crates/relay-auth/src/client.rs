//! HTTP implementation of the authority contract.
//!
//! Endpoints: `POST {base}/realtime/auth`, `/realtime/subscribe`,
//! `/realtime/filter`. Every request carries `Authorization: Bearer
//! <access_token>` and the `apikey` header; every call shares one
//! connection pool with a per-request timeout baked into the client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::types::{
    AuthContext, AuthRequest, AuthResponse, ConnectionIdentity, FilterRequest, FilterResponse,
    HandshakeCredentials, SubscribeRequest, SubscribeResponse,
};
use crate::Authority;

/// Reqwest-backed authority client.
pub struct AuthorityClient {
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AuthorityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AuthorityClient {
    /// Build a client against `base_url` with a per-call `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport {
                reason: e.to_string(),
            })?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            let _ = base_url.pop();
        }
        Ok(Self { base_url, client })
    }

    async fn post<Req: serde::Serialize + ?Sized, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        api_key: &str,
        access_token: &str,
        body: &Req,
    ) -> Result<Resp, AuthError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {access_token}"))
            .header("apikey", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout
                } else {
                    AuthError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "authority returned non-success status");
            return Err(AuthError::Transport {
                reason: format!("status {status}"),
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| AuthError::InvalidResponse {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Authority for AuthorityClient {
    async fn authenticate(
        &self,
        credentials: &HandshakeCredentials,
    ) -> Result<ConnectionIdentity, AuthError> {
        let body = AuthRequest {
            apikey: &credentials.api_key,
            access_token: &credentials.access_token,
        };
        let resp: AuthResponse = self
            .post(
                "/realtime/auth",
                &credentials.api_key,
                &credentials.access_token,
                &body,
            )
            .await?;

        let identity = match (resp.success, resp.data) {
            (true, Some(identity)) => identity,
            _ => return Err(AuthError::Denied),
        };

        // The client's claimed scope must match what the authority
        // minted; a mismatch is a denial, not a correction.
        if identity.tenant_id != credentials.tenant_id
            || identity.project_id != credentials.project_id
        {
            warn!(
                connection_id = %identity.connection_id,
                claimed_tenant = %credentials.tenant_id,
                issued_tenant = %identity.tenant_id,
                "authority identity scope mismatch"
            );
            return Err(AuthError::Denied);
        }

        debug!(connection_id = %identity.connection_id, user_id = %identity.user_id, "authenticated");
        Ok(identity)
    }

    async fn authorize_subscription(
        &self,
        ctx: &AuthContext,
        topic: &str,
        filters: &Value,
        event_types: &[String],
    ) -> Result<bool, AuthError> {
        let body = SubscribeRequest {
            connection_id: ctx.connection_id.as_str(),
            channel: topic,
            filters,
            event_types,
        };
        let resp: SubscribeResponse = self
            .post(
                "/realtime/subscribe",
                &ctx.api_key,
                &ctx.access_token,
                &body,
            )
            .await?;
        Ok(resp.success)
    }

    async fn filter_for_recipient(
        &self,
        ctx: &AuthContext,
        payload: &Value,
    ) -> Result<Option<Value>, AuthError> {
        let body = FilterRequest {
            connection_id: ctx.connection_id.as_str(),
            payload,
        };
        let resp: FilterResponse = self
            .post("/realtime/filter", &ctx.api_key, &ctx.access_token, &body)
            .await?;
        if !resp.success {
            return Ok(None);
        }
        Ok(resp.data)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
