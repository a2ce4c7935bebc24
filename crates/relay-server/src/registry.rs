//! Connection registry and topic subscription index.
//!
//! Both tables live behind one lock so every compound operation —
//! subscribe, unsubscribe, remove-connection — mutates the connection's
//! subscription set and the reverse index in a single critical section.
//! Nothing awaits while the lock is held, so a handshake or subscribe is
//! never observable half-applied.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use relay_auth::{AuthContext, ConnectionIdentity, HandshakeCredentials};
use relay_core::ids::{ConnectionId, SocketId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::TOPICS_ACTIVE;

/// Maximum total lifetime frame drops before a slow client is
/// force-disconnected.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// One frame queued to a connection's writer task.
#[derive(Clone, Debug)]
pub enum Outbound {
    /// Serialized envelope, shared across recipients where the payload
    /// is identical.
    Text(Arc<String>),
    /// Close frame; the writer sends it and exits.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable reason string.
        reason: String,
    },
}

/// One live transport session.
///
/// Identity fields are immutable after the handshake; liveness state
/// (`last_heartbeat`, drop count) uses interior mutability so fan-out
/// and the sweeper can touch it through the shared `Arc`.
pub struct Connection {
    /// Canonical id from the authority; the registry key.
    pub id: ConnectionId,
    /// Local-process correlator for log lines.
    pub socket_id: SocketId,
    /// Authenticated user.
    pub user_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning project.
    pub project_id: String,
    /// Opaque capability set from the handshake.
    pub permissions: Vec<String>,
    /// Wall-clock connect time, for session-duration diagnostics.
    pub connected_at: DateTime<Utc>,
    /// Peer address, when known.
    pub ip_address: Option<String>,
    /// Client `User-Agent`, when sent.
    pub user_agent: Option<String>,

    api_key: String,
    access_token: String,
    sender: mpsc::Sender<Outbound>,
    last_heartbeat: Mutex<Instant>,
    drops: AtomicU64,
    closed: CancellationToken,
}

impl Connection {
    /// Build a connection from a validated handshake.
    pub fn new(
        identity: ConnectionIdentity,
        credentials: &HandshakeCredentials,
        ip_address: Option<String>,
        user_agent: Option<String>,
        sender: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            id: identity.connection_id,
            socket_id: SocketId::generate(),
            user_id: identity.user_id,
            tenant_id: identity.tenant_id,
            project_id: identity.project_id,
            permissions: identity.permissions,
            connected_at: Utc::now(),
            ip_address,
            user_agent,
            api_key: credentials.api_key.clone(),
            access_token: credentials.access_token.clone(),
            sender,
            last_heartbeat: Mutex::new(Instant::now()),
            drops: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a text frame. Returns `false` (and counts a drop) when the
    /// outbound channel is full or the writer is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.sender.try_send(Outbound::Text(frame)).is_ok() {
            true
        } else {
            let _ = self.drops.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Lifetime count of dropped frames.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Queue a close frame and signal both socket tasks to exit.
    ///
    /// The writer drains the close frame before observing the
    /// cancellation, so the peer sees the code when the channel has room.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.sender.try_send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.closed.cancel();
    }

    /// Token cancelled once [`close`](Self::close) has been called.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Record a received heartbeat.
    pub fn touch_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Time since the last heartbeat (or since connect).
    pub fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Cached credentials for outbound authority calls.
    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            connection_id: self.id.clone(),
            api_key: self.api_key.clone(),
            access_token: self.access_token.clone(),
        }
    }

    /// Wall-clock session duration in seconds.
    pub fn session_secs(&self) -> f64 {
        let millis = Utc::now()
            .signed_duration_since(self.connected_at)
            .num_milliseconds();
        millis.max(0) as f64 / 1000.0
    }

    #[cfg(test)]
    pub(crate) fn backdate_heartbeat(&self, age: Duration) {
        *self.last_heartbeat.lock() = Instant::now() - age;
    }
}

struct Entry {
    conn: Arc<Connection>,
    subscriptions: HashSet<String>,
}

struct Inner {
    connections: HashMap<ConnectionId, Entry>,
    topics: HashMap<String, HashSet<ConnectionId>>,
}

/// In-memory table of live connections plus the topic reverse index.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                connections: HashMap::new(),
                topics: HashMap::new(),
            }),
        }
    }

    /// Insert a connection. If the same connection id was already
    /// present (a reconnect racing its own teardown), the previous
    /// entry is returned so the caller can close its socket.
    pub fn insert(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        let previous = inner.connections.insert(
            conn.id.clone(),
            Entry {
                conn,
                subscriptions: HashSet::new(),
            },
        );
        previous.map(|entry| {
            Self::drop_topics(&mut inner, &entry);
            entry.conn
        })
    }

    /// Remove a connection and every index entry it was part of, in one
    /// critical section. Idempotent: a second remove returns `None`.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        let entry = inner.connections.remove(id)?;
        Self::drop_topics(&mut inner, &entry);
        Some(entry.conn)
    }

    /// Remove the entry for `conn.id` only if it still belongs to this
    /// session. A superseded socket's exit path must not deregister the
    /// replacement that took over its id.
    pub fn remove_if(&self, conn: &Arc<Connection>) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write();
        if !inner
            .connections
            .get(&conn.id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.conn, conn))
        {
            return None;
        }
        let entry = inner.connections.remove(&conn.id)?;
        Self::drop_topics(&mut inner, &entry);
        Some(entry.conn)
    }

    fn drop_topics(inner: &mut Inner, entry: &Entry) {
        for topic in &entry.subscriptions {
            if let Some(set) = inner.topics.get_mut(topic) {
                let _ = set.remove(&entry.conn.id);
                if set.is_empty() {
                    let _ = inner.topics.remove(topic);
                }
            }
        }
        gauge!(TOPICS_ACTIVE).set(inner.topics.len() as f64);
    }

    /// Resolve a live connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().connections.get(id).map(|e| Arc::clone(&e.conn))
    }

    /// Add `topic` to the connection's subscription set and the reverse
    /// index together. Returns `false` when the connection is gone —
    /// the caller discards the (already authorized) subscribe.
    pub fn subscribe(&self, id: &ConnectionId, topic: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = inner.connections.get_mut(id) else {
            return false;
        };
        let _ = entry.subscriptions.insert(topic.to_string());
        let _ = inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id.clone());
        gauge!(TOPICS_ACTIVE).set(inner.topics.len() as f64);
        debug!(connection_id = %id, topic, "subscribed");
        true
    }

    /// Remove `topic` from both sides. Idempotent: unsubscribing from a
    /// topic never subscribed is a no-op.
    pub fn unsubscribe(&self, id: &ConnectionId, topic: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.connections.get_mut(id) {
            let _ = entry.subscriptions.remove(topic);
        }
        if let Some(set) = inner.topics.get_mut(topic) {
            let _ = set.remove(id);
            if set.is_empty() {
                let _ = inner.topics.remove(topic);
            }
        }
        gauge!(TOPICS_ACTIVE).set(inner.topics.len() as f64);
    }

    /// Candidate connection ids for a topic. Empty when nobody is
    /// subscribed (the common case for most change events).
    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.inner
            .read()
            .topics
            .get(topic)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The connection's current subscription set.
    pub fn subscriptions_of(&self, id: &ConnectionId) -> Option<HashSet<String>> {
        self.inner
            .read()
            .connections
            .get(id)
            .map(|e| e.subscriptions.clone())
    }

    /// Connections whose heartbeat is older than `timeout`.
    pub fn expired(&self, timeout: Duration) -> Vec<Arc<Connection>> {
        self.inner
            .read()
            .connections
            .values()
            .filter(|e| e.conn.heartbeat_age() > timeout)
            .map(|e| Arc::clone(&e.conn))
            .collect()
    }

    /// All live connection ids (mirror heartbeat refresh).
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.read().connections.keys().cloned().collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.inner.read().topics.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
