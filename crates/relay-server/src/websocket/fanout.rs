//! Event fan-out to subscribed connections.
//!
//! One event, one topic lookup, then one isolated delivery future per
//! candidate recipient: liveness re-check, per-recipient authority
//! filter, serialize, queue. A failure on one recipient never aborts
//! delivery to the rest.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use relay_core::envelope::Envelope;
use relay_core::event::ChangeEvent;
use relay_core::ids::ConnectionId;
use tracing::{debug, warn};

use crate::metrics::{
    AUTHORITY_REQUEST_DURATION_SECONDS, FANOUT_DELIVERIES_TOTAL, FANOUT_DROPS_TOTAL,
    FANOUT_DURATION_SECONDS, FANOUT_FILTERED_TOTAL, NOTIFY_UNDELIVERABLE_TOTAL,
};
use crate::registry::MAX_TOTAL_DROPS;
use crate::state::AppState;
use crate::websocket::connection::teardown;

/// Close code for a consumer that cannot keep up with its own topics.
const CLOSE_SLOW_CONSUMER: u16 = 4001;

/// Fan out a database-origin event to every live, authorized subscriber.
pub async fn route_event(state: &AppState, event: &ChangeEvent) {
    route(state, event, None).await;
}

/// Fan out a client-originated event to the other subscribers of its
/// topic (the origin never receives its own broadcast).
pub async fn route_client_event(state: &AppState, event: &ChangeEvent, origin: &ConnectionId) {
    route(state, event, Some(origin)).await;
}

async fn route(state: &AppState, event: &ChangeEvent, exclude: Option<&ConnectionId>) {
    let Some(topic) = event.topic() else {
        counter!(NOTIFY_UNDELIVERABLE_TOTAL).increment(1);
        warn!(event_type = %event.event_type, "dropping change event with no table or channel");
        return;
    };

    // Zero subscribers is the common case for most change events; it is
    // a silent no-op and must not reach the authority.
    let candidates = state.registry.subscribers(&topic);
    if candidates.is_empty() {
        return;
    }

    let payload = event.payload();
    let deliveries: Vec<_> = candidates
        .iter()
        .filter(|id| exclude != Some(*id))
        .map(|id| deliver_one(state, &topic, &event.event_type, &payload, id))
        .collect();
    let recipients = deliveries.len();
    let start = Instant::now();
    let _: Vec<()> = futures::future::join_all(deliveries).await;
    histogram!(FANOUT_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
    debug!(topic, event_type = %event.event_type, recipients, "fan-out complete");
}

async fn deliver_one(
    state: &AppState,
    topic: &str,
    event_type: &str,
    payload: &serde_json::Value,
    id: &ConnectionId,
) {
    // The subscriber may have disconnected since the index lookup.
    let Some(conn) = state.registry.get(id) else {
        return;
    };

    let start = Instant::now();
    let filtered = state
        .authority
        .filter_for_recipient(&conn.auth_context(), payload)
        .await;
    histogram!(AUTHORITY_REQUEST_DURATION_SECONDS, "operation" => "filter")
        .record(start.elapsed().as_secs_f64());

    let filtered = match filtered {
        Ok(Some(filtered)) => filtered,
        Ok(None) => {
            counter!(FANOUT_FILTERED_TOTAL).increment(1);
            debug!(connection_id = %id, topic, "filter vetoed delivery");
            return;
        }
        Err(e) => {
            // Fail-closed: an authority error for one recipient only
            // suppresses that recipient.
            counter!(FANOUT_FILTERED_TOTAL).increment(1);
            warn!(connection_id = %id, topic, error = %e, "filter call failed, skipping recipient");
            return;
        }
    };

    // The filter call suspended; discard the result if the connection
    // vanished in the meantime, or if another socket took over the id
    // (a frame for a stale session must not reach its successor's slot).
    let still_current = state
        .registry
        .get(id)
        .is_some_and(|current| Arc::ptr_eq(&current, &conn));
    if !still_current {
        return;
    }

    let envelope = Envelope::push(topic, event_type, filtered);
    let frame = match serde_json::to_string(&envelope) {
        Ok(frame) => Arc::new(frame),
        Err(e) => {
            warn!(topic, error = %e, "failed to serialize push frame");
            return;
        }
    };

    if conn.send(frame) {
        counter!(FANOUT_DELIVERIES_TOTAL).increment(1);
    } else {
        counter!(FANOUT_DROPS_TOTAL).increment(1);
        let drops = conn.drop_count();
        if drops >= MAX_TOTAL_DROPS {
            warn!(connection_id = %id, topic, drops, "disconnecting slow client");
            conn.close(CLOSE_SLOW_CONSUMER, "slow consumer");
            teardown(state, &conn, "slow_consumer");
        } else {
            warn!(connection_id = %id, topic, total_drops = drops, "outbound channel full, frame dropped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
