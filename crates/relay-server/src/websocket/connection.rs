//! Connection lifecycle: handshake, socket tasks, teardown.
//!
//! Rejections before the registry insert close the raw socket directly;
//! after the insert every exit path funnels through [`teardown`], which
//! is idempotent (first caller wins) so the reader loop, the heartbeat
//! sweep, and the slow-consumer disconnect can race it safely.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_auth::HandshakeCredentials;
use relay_core::envelope::{Envelope, close_code};
use relay_core::errors::HandshakeError;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{
    AUTHORITY_REQUEST_DURATION_SECONDS, HANDSHAKE_REJECTIONS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::{Connection, Outbound};
use crate::state::AppState;
use crate::websocket::handler;

/// Handshake query parameters. All four are required; validation is
/// deferred past the upgrade so the reason reaches the client as a
/// close frame instead of an opaque HTTP 400.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Project API key (wire name `apikey`).
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    /// User access token.
    pub access_token: Option<String>,
    /// Expected tenant scope.
    pub tenant_id: Option<String>,
    /// Expected project scope.
    pub project_id: Option<String>,
}

impl ConnectParams {
    fn into_credentials(self) -> Result<HandshakeCredentials, HandshakeError> {
        match (self.api_key, self.access_token, self.tenant_id, self.project_id) {
            (Some(api_key), Some(access_token), Some(tenant_id), Some(project_id)) => {
                Ok(HandshakeCredentials {
                    api_key,
                    access_token,
                    tenant_id,
                    project_id,
                })
            }
            (api_key, access_token, tenant_id, project_id) => {
                let missing: Vec<&str> = [
                    ("apikey", api_key.is_none()),
                    ("access_token", access_token.is_none()),
                    ("tenant_id", tenant_id.is_none()),
                    ("project_id", project_id.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(HandshakeError::MissingParameters {
                    missing: missing.join(", "),
                })
            }
        }
    }
}

/// `GET /realtime` upgrade entry point.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    ws.max_message_size(state.settings.server.max_message_size)
        .on_upgrade(move |socket| handle_socket(state, socket, params, addr, user_agent))
}

async fn handle_socket(
    state: Arc<AppState>,
    socket: WebSocket,
    params: ConnectParams,
    addr: SocketAddr,
    user_agent: Option<String>,
) {
    let credentials = match params.into_credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            counter!(HANDSHAKE_REJECTIONS_TOTAL, "reason" => "missing_parameters").increment(1);
            debug!(peer = %addr, error = %e, "rejecting handshake");
            reject(socket, close_code::POLICY_VIOLATION, &e.to_string()).await;
            return;
        }
    };

    let start = Instant::now();
    let identity = state.authority.authenticate(&credentials).await;
    histogram!(AUTHORITY_REQUEST_DURATION_SECONDS, "operation" => "auth")
        .record(start.elapsed().as_secs_f64());
    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => {
            counter!(HANDSHAKE_REJECTIONS_TOTAL, "reason" => "denied").increment(1);
            warn!(peer = %addr, error = %e, "authentication failed");
            reject(
                socket,
                close_code::POLICY_VIOLATION,
                &HandshakeError::AuthenticationFailed.to_string(),
            )
            .await;
            return;
        }
    };

    let (tx, rx) = mpsc::channel(state.settings.server.outbound_buffer);
    let conn = Arc::new(Connection::new(
        identity,
        &credentials,
        Some(addr.ip().to_string()),
        user_agent,
        tx,
    ));
    let id = conn.id.clone();

    // Same authority id reconnecting: the new socket takes over and the
    // old one is closed rather than left to time out.
    if let Some(previous) = state.registry.insert(Arc::clone(&conn)) {
        debug!(connection_id = %id, "superseding existing session");
        previous.close(close_code::POLICY_VIOLATION, "superseded by new connection");
    }

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(
        connection_id = %id,
        socket_id = %conn.socket_id,
        user_id = %conn.user_id,
        peer = %addr,
        "connection established"
    );

    if let Some(mirror) = state.mirror.clone() {
        let conn = Arc::clone(&conn);
        let _ = tokio::spawn(async move {
            if let Err(e) = mirror.record_connect(&conn).await {
                debug!(connection_id = %conn.id, error = %e, "mirror connect write failed");
            }
        });
    }

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, rx, conn.closed()));
    read_loop(&state, &conn, stream).await;

    teardown(&state, &conn, "socket_closed");
    let _ = writer.await;
}

/// Owns the socket's send half. Exits on a close frame, a dead peer, or
/// cancellation; `biased` lets a queued close frame drain before the
/// cancellation (set by the same [`Connection::close`]) is observed.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
                None => break,
            },
            () = closed.cancelled() => break,
        }
    }
}

async fn read_loop(state: &AppState, conn: &Arc<Connection>, mut stream: SplitStream<WebSocket>) {
    let closed = conn.closed();
    loop {
        let message = tokio::select! {
            () = closed.cancelled() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = handler::handle_frame(state, conn, text.as_str()).await {
                    queue_reply(conn, &reply);
                }
            }
            Some(Ok(Message::Binary(_))) => {
                queue_reply(conn, &Envelope::error(None, "binary frames are not supported"));
            }
            // axum answers pings itself
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(connection_id = %conn.id, error = %e, "socket read error");
                break;
            }
        }
    }
}

/// Close a socket that never made it into the registry. The reason is
/// the client-facing handshake failure string.
async fn reject(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

fn queue_reply(conn: &Connection, envelope: &Envelope) {
    match serde_json::to_string(envelope) {
        Ok(frame) => {
            let _ = conn.send(Arc::new(frame));
        }
        Err(e) => warn!(connection_id = %conn.id, error = %e, "failed to serialize reply"),
    }
}

/// Remove the connection from the registry and settle the accounting.
///
/// Idempotent: whoever gets the registry entry does the bookkeeping,
/// later callers return immediately. The removal is guarded by session
/// identity, so a superseded socket's exit never deregisters the
/// replacement that took over its connection id.
pub(crate) fn teardown(state: &AppState, conn: &Arc<Connection>, reason: &'static str) {
    let Some(conn) = state.registry.remove_if(conn) else {
        return;
    };
    conn.closed().cancel();

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.session_secs());
    info!(
        connection_id = %conn.id,
        socket_id = %conn.socket_id,
        reason,
        session_secs = conn.session_secs(),
        "connection closed"
    );

    if let Some(mirror) = state.mirror.clone() {
        let id = conn.id.clone();
        let _ = tokio::spawn(async move {
            if let Err(e) = mirror.record_disconnect(&id).await {
                debug!(connection_id = %id, error = %e, "mirror disconnect write failed");
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
