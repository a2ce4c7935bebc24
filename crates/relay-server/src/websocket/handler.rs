//! Wire message dispatch for established connections.
//!
//! One entry point, [`handle_frame`], owns the request/reply pairing:
//! decode the envelope, dispatch on the event name, and hand back the
//! reply frame (if any) for the caller to queue. The only suspension
//! points are authority calls; registry mutations happen after the
//! await, guarded by a liveness re-check so a result is never applied
//! to a connection that disappeared mid-call.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_core::envelope::{Envelope, ReplyStatus, events};
use relay_core::event::ChangeEvent;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::{
    AUTHORITY_REQUEST_DURATION_SECONDS, MESSAGES_RECEIVED_TOTAL, SUBSCRIBE_DENIALS_TOTAL,
};
use crate::registry::Connection;
use crate::state::AppState;
use crate::websocket::fanout;

/// Handle one inbound text frame. Returns the reply to queue, or `None`
/// when there is nothing to send (connection vanished mid-request).
pub async fn handle_frame(state: &AppState, conn: &Arc<Connection>, raw: &str) -> Option<Envelope> {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Salvage the correlator if the frame was at least JSON, so
            // the client can match the error to its request.
            let reference = serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|v| v.get("ref")?.as_str().map(String::from));
            counter!(MESSAGES_RECEIVED_TOTAL, "event" => "malformed").increment(1);
            debug!(connection_id = %conn.id, error = %e, "malformed frame");
            return Some(Envelope::error(reference, "malformed message"));
        }
    };

    counter!(MESSAGES_RECEIVED_TOTAL, "event" => envelope.event.clone()).increment(1);

    match envelope.event.as_str() {
        events::HEARTBEAT => {
            conn.touch_heartbeat();
            Some(Envelope::reply(
                envelope.topic,
                envelope.reference,
                ReplyStatus::Ok,
                serde_json::json!({}),
            ))
        }
        events::JOIN => handle_join(state, conn, envelope).await,
        events::LEAVE => {
            let Some(topic) = envelope.topic else {
                return Some(Envelope::error(envelope.reference, "phx_leave requires a topic"));
            };
            // Idempotent: leaving a topic never joined still succeeds.
            state.registry.unsubscribe(&conn.id, &topic);
            Some(Envelope::reply(
                Some(topic),
                envelope.reference,
                ReplyStatus::Ok,
                serde_json::json!({}),
            ))
        }
        events::BROADCAST | events::PRESENCE_UPDATE => {
            handle_client_event(state, conn, envelope).await
        }
        other => {
            debug!(connection_id = %conn.id, event = other, "unrecognized event");
            Some(Envelope::error(envelope.reference, "unrecognized event"))
        }
    }
}

async fn handle_join(
    state: &AppState,
    conn: &Arc<Connection>,
    envelope: Envelope,
) -> Option<Envelope> {
    let Some(topic) = envelope.topic else {
        return Some(Envelope::error(envelope.reference, "phx_join requires a topic"));
    };

    match authorize(state, conn, &topic, &envelope.payload).await {
        Ok(true) => {
            if !state.registry.subscribe(&conn.id, &topic) {
                // Connection torn down while the authority call was in
                // flight; discard rather than resurrect index state.
                return None;
            }
            Some(Envelope::reply(
                Some(topic),
                envelope.reference,
                ReplyStatus::Ok,
                serde_json::json!({}),
            ))
        }
        Ok(false) | Err(_) => Some(denial_reply(topic, envelope.reference)),
    }
}

async fn handle_client_event(
    state: &AppState,
    conn: &Arc<Connection>,
    envelope: Envelope,
) -> Option<Envelope> {
    let Some(topic) = envelope.topic else {
        return Some(Envelope::error(
            envelope.reference,
            "broadcast requires a topic",
        ));
    };

    // Client-originated events pass the same authority gate as a
    // subscribe before entering the fan-out path.
    match authorize(state, conn, &topic, &envelope.payload).await {
        Ok(true) => {}
        Ok(false) | Err(_) => return Some(denial_reply(topic, envelope.reference)),
    }

    let event_type = envelope
        .payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(envelope.event.as_str())
        .to_string();
    let record = envelope
        .payload
        .get("payload")
        .cloned()
        .unwrap_or_else(|| envelope.payload.clone());
    let event = ChangeEvent {
        table: None,
        channel: Some(topic.clone()),
        event_type,
        record: Some(record),
        old_record: None,
        project_id: Some(conn.project_id.clone()),
        tenant_id: Some(conn.tenant_id.clone()),
        timestamp: None,
    };

    fanout::route_client_event(state, &event, &conn.id).await;

    Some(Envelope::reply(
        Some(topic),
        envelope.reference,
        ReplyStatus::Ok,
        serde_json::json!({}),
    ))
}

/// Run the authority's subscription check, fail-closed on error.
async fn authorize(
    state: &AppState,
    conn: &Arc<Connection>,
    topic: &str,
    payload: &Value,
) -> Result<bool, ()> {
    let filters = payload
        .get("filters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let event_types: Vec<String> = payload
        .get("event_types")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let start = Instant::now();
    let result = state
        .authority
        .authorize_subscription(&conn.auth_context(), topic, &filters, &event_types)
        .await;
    histogram!(AUTHORITY_REQUEST_DURATION_SECONDS, "operation" => "subscribe")
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(true) => Ok(true),
        Ok(false) => {
            counter!(SUBSCRIBE_DENIALS_TOTAL).increment(1);
            Ok(false)
        }
        Err(e) => {
            counter!(SUBSCRIBE_DENIALS_TOTAL).increment(1);
            warn!(connection_id = %conn.id, topic, error = %e, "authority call failed, denying");
            Err(())
        }
    }
}

fn denial_reply(topic: String, reference: Option<String>) -> Envelope {
    // Authority errors collapse to one generic denial; the detail
    // stays in our logs.
    Envelope::reply(
        Some(topic),
        reference,
        ReplyStatus::Error,
        serde_json::json!({"reason": "subscription denied"}),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
