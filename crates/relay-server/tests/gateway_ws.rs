//! End-to-end tests over a real socket: handshake, protocol round
//! trips, and change-event delivery against a served gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_auth::{AuthContext, AuthError, Authority, ConnectionIdentity, HandshakeCredentials};
use relay_core::event::ChangeEvent;
use relay_core::ids::ConnectionId;
use relay_server::app::build_router;
use relay_server::state::AppState;
use relay_server::websocket::fanout;
use relay_settings::RelaySettings;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Allows everything; `authenticate` derives the connection id from the
/// api key so each client controls its own identity.
struct EchoAuthority {
    deny: bool,
}

#[async_trait]
impl Authority for EchoAuthority {
    async fn authenticate(
        &self,
        credentials: &HandshakeCredentials,
    ) -> Result<ConnectionIdentity, AuthError> {
        if self.deny {
            return Err(AuthError::Denied);
        }
        Ok(ConnectionIdentity {
            connection_id: ConnectionId::new(format!("conn_{}", credentials.api_key)),
            user_id: format!("user_{}", credentials.api_key),
            tenant_id: credentials.tenant_id.clone(),
            project_id: credentials.project_id.clone(),
            permissions: vec![],
        })
    }

    async fn authorize_subscription(
        &self,
        _ctx: &AuthContext,
        _topic: &str,
        _filters: &Value,
        _event_types: &[String],
    ) -> Result<bool, AuthError> {
        Ok(true)
    }

    async fn filter_for_recipient(
        &self,
        _ctx: &AuthContext,
        payload: &Value,
    ) -> Result<Option<Value>, AuthError> {
        Ok(Some(payload.clone()))
    }
}

async fn serve(deny: bool) -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(AppState::new(
        Arc::new(EchoAuthority { deny }) as Arc<dyn Authority>,
        Arc::new(RelaySettings::default()),
        None,
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(Arc::clone(&state), None);
    let _ = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (state, addr)
}

async fn connect(addr: SocketAddr, api_key: &str) -> WsClient {
    let url = format!(
        "ws://{addr}/realtime?apikey={api_key}&access_token=tok&tenant_id=ten&project_id=proj"
    );
    let (ws, _) = connect_async(url.as_str()).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsClient, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("socket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn recv_close(ws: &mut WsClient) -> (u16, String) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("socket error");
        match msg {
            Message::Close(Some(frame)) => {
                return (u16::from(frame.code), frame.reason.as_str().to_string());
            }
            Message::Close(None) => return (1005, String::new()),
            _ => {}
        }
    }
}

#[tokio::test]
async fn missing_params_close_with_policy_violation() {
    let (_state, addr) = serve(false).await;
    let url = format!("ws://{addr}/realtime?apikey=k&access_token=tok");
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    let (code, reason) = recv_close(&mut ws).await;
    assert_eq!(code, 1008);
    assert_eq!(reason, "missing parameters: tenant_id, project_id");
}

#[tokio::test]
async fn denied_handshake_closes_with_policy_violation() {
    let (state, addr) = serve(true).await;
    let mut ws = connect(addr, "k").await;

    let (code, reason) = recv_close(&mut ws).await;
    assert_eq!(code, 1008);
    assert_eq!(reason, "authentication failed");
    assert_eq!(state.registry.connection_count(), 0);
}

#[tokio::test]
async fn heartbeat_echoes_ref() {
    let (_state, addr) = serve(false).await;
    let mut ws = connect(addr, "a").await;

    send_json(&mut ws, json!({"event": "heartbeat", "ref": "42"})).await;
    let reply = recv_json(&mut ws).await;

    assert_eq!(reply["event"], "phx_reply");
    assert_eq!(reply["ref"], "42");
    assert_eq!(reply["payload"]["status"], "ok");
}

#[tokio::test]
async fn join_then_change_event_is_delivered() {
    let (state, addr) = serve(false).await;
    let mut ws = connect(addr, "a").await;

    send_json(
        &mut ws,
        json!({"event": "phx_join", "topic": "table:orders", "payload": {}, "ref": "1"}),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["payload"]["status"], "ok");
    assert_eq!(reply["topic"], "table:orders");

    let event: ChangeEvent = serde_json::from_value(json!({
        "table": "orders",
        "type": "UPDATE",
        "record": {"id": 1, "status": "shipped"}
    }))
    .unwrap();
    fanout::route_event(&state, &event).await;

    let push = recv_json(&mut ws).await;
    assert_eq!(push["event"], "UPDATE");
    assert_eq!(push["topic"], "table:orders");
    assert_eq!(push["payload"]["record"]["status"], "shipped");
}

#[tokio::test]
async fn broadcast_reaches_peer_but_not_origin() {
    let (_state, addr) = serve(false).await;
    let mut origin = connect(addr, "a").await;
    let mut peer = connect(addr, "b").await;

    for ws in [&mut origin, &mut peer] {
        send_json(
            ws,
            json!({"event": "phx_join", "topic": "room:lobby", "payload": {}, "ref": "1"}),
        )
        .await;
        let reply = recv_json(ws).await;
        assert_eq!(reply["payload"]["status"], "ok");
    }

    send_json(
        &mut origin,
        json!({
            "event": "broadcast",
            "topic": "room:lobby",
            "payload": {"type": "message", "payload": {"text": "hi"}},
            "ref": "2"
        }),
    )
    .await;

    let delivered = recv_json(&mut peer).await;
    assert_eq!(delivered["event"], "message");
    assert_eq!(delivered["topic"], "room:lobby");
    assert_eq!(delivered["payload"]["record"]["text"], "hi");

    // The origin's next frame is its own reply, not an echo
    let reply = recv_json(&mut origin).await;
    assert_eq!(reply["event"], "phx_reply");
    assert_eq!(reply["ref"], "2");
    assert_eq!(reply["payload"]["status"], "ok");
}

#[tokio::test]
async fn leave_stops_delivery() {
    let (state, addr) = serve(false).await;
    let mut ws = connect(addr, "a").await;

    send_json(
        &mut ws,
        json!({"event": "phx_join", "topic": "table:orders", "payload": {}, "ref": "1"}),
    )
    .await;
    let _ = recv_json(&mut ws).await;

    send_json(
        &mut ws,
        json!({"event": "phx_leave", "topic": "table:orders", "ref": "2"}),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["payload"]["status"], "ok");

    let event: ChangeEvent =
        serde_json::from_value(json!({"table": "orders", "type": "INSERT", "record": {}})).unwrap();
    fanout::route_event(&state, &event).await;

    // Heartbeat round trip proves nothing else was queued first
    send_json(&mut ws, json!({"event": "heartbeat", "ref": "3"})).await;
    let next = recv_json(&mut ws).await;
    assert_eq!(next["event"], "phx_reply");
    assert_eq!(next["ref"], "3");
}

#[tokio::test]
async fn malformed_frame_gets_error_reply() {
    let (_state, addr) = serve(false).await;
    let mut ws = connect(addr, "a").await;

    ws.send(Message::text(r#"{"event": 7, "ref": "9"}"#.to_string()))
        .await
        .unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["ref"], "9");
}
