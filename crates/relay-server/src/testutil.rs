//! Shared test fixtures: canned connections and a scriptable authority.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use relay_auth::{AuthContext, AuthError, Authority, ConnectionIdentity, HandshakeCredentials};
use relay_core::ids::ConnectionId;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::registry::{Connection, Outbound};

pub(crate) fn make_connection(id: &str) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
    make_connection_with_buffer(id, 32)
}

pub(crate) fn make_connection_with_buffer(
    id: &str,
    buffer: usize,
) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(buffer);
    let identity = ConnectionIdentity {
        connection_id: ConnectionId::new(id),
        user_id: format!("user_{id}"),
        tenant_id: "ten_1".into(),
        project_id: "proj_1".into(),
        permissions: vec![],
    };
    let conn = Connection::new(identity, &credentials(), None, None, tx);
    (Arc::new(conn), rx)
}

pub(crate) fn credentials() -> HandshakeCredentials {
    HandshakeCredentials {
        api_key: "key".into(),
        access_token: "tok".into(),
        tenant_id: "ten_1".into(),
        project_id: "proj_1".into(),
    }
}

/// How the stub answers `authorize_subscription`.
pub(crate) enum SubscribeBehavior {
    Allow,
    Deny,
    /// Transport failure; callers must fail closed.
    Fail,
}

/// Scriptable in-process authority.
///
/// `authenticate` echoes an identity whose `connection_id` is
/// `conn_<apikey>`; recipients in `veto` get `None` from the fan-out
/// filter; everyone else gets the payload back unchanged (or `redact`
/// when set). Call counters let tests assert the authority was (not)
/// consulted.
pub(crate) struct StubAuthority {
    pub subscribe: SubscribeBehavior,
    pub veto: HashSet<ConnectionId>,
    pub filter_fail: HashSet<ConnectionId>,
    pub redact: Option<Value>,
    pub deny_authenticate: bool,
    pub subscribe_calls: AtomicUsize,
    pub filter_calls: AtomicUsize,
}

impl StubAuthority {
    pub fn allow_all() -> Self {
        Self {
            subscribe: SubscribeBehavior::Allow,
            veto: HashSet::new(),
            filter_fail: HashSet::new(),
            redact: None,
            deny_authenticate: false,
            subscribe_calls: AtomicUsize::new(0),
            filter_calls: AtomicUsize::new(0),
        }
    }

    pub fn filter_fail_for(id: &str) -> Self {
        let mut stub = Self::allow_all();
        let _ = stub.filter_fail.insert(ConnectionId::from(id));
        stub
    }

    pub fn deny_subscribe() -> Self {
        Self {
            subscribe: SubscribeBehavior::Deny,
            ..Self::allow_all()
        }
    }

    pub fn fail_subscribe() -> Self {
        Self {
            subscribe: SubscribeBehavior::Fail,
            ..Self::allow_all()
        }
    }

    pub fn veto_for(id: &str) -> Self {
        let mut stub = Self::allow_all();
        let _ = stub.veto.insert(ConnectionId::from(id));
        stub
    }

    pub fn deny_authenticate() -> Self {
        Self {
            deny_authenticate: true,
            ..Self::allow_all()
        }
    }
}

#[async_trait]
impl Authority for StubAuthority {
    async fn authenticate(
        &self,
        credentials: &HandshakeCredentials,
    ) -> Result<ConnectionIdentity, AuthError> {
        if self.deny_authenticate {
            return Err(AuthError::Denied);
        }
        Ok(ConnectionIdentity {
            connection_id: ConnectionId::new(format!("conn_{}", credentials.api_key)),
            user_id: "user_1".into(),
            tenant_id: credentials.tenant_id.clone(),
            project_id: credentials.project_id.clone(),
            permissions: vec!["subscribe".into()],
        })
    }

    async fn authorize_subscription(
        &self,
        _ctx: &AuthContext,
        _topic: &str,
        _filters: &Value,
        _event_types: &[String],
    ) -> Result<bool, AuthError> {
        let _ = self.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        match self.subscribe {
            SubscribeBehavior::Allow => Ok(true),
            SubscribeBehavior::Deny => Ok(false),
            SubscribeBehavior::Fail => Err(AuthError::Timeout),
        }
    }

    async fn filter_for_recipient(
        &self,
        ctx: &AuthContext,
        payload: &Value,
    ) -> Result<Option<Value>, AuthError> {
        let _ = self.filter_calls.fetch_add(1, Ordering::Relaxed);
        if self.filter_fail.contains(&ctx.connection_id) {
            return Err(AuthError::Timeout);
        }
        if self.veto.contains(&ctx.connection_id) {
            return Ok(None);
        }
        Ok(Some(
            self.redact.clone().unwrap_or_else(|| payload.clone()),
        ))
    }
}
