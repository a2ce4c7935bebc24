//! Postgres change listener.
//!
//! One long-lived `LISTEN` session over the configured notification
//! channels; each NOTIFY payload is decoded into a [`ChangeEvent`] and
//! handed to fan-out. A dropped connection is retried with doubling
//! backoff, and an undecodable payload is dropped at the source — it
//! never reaches a client.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use relay_core::event::ChangeEvent;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::NOTIFY_DECODE_FAILURES_TOTAL;
use crate::state::AppState;
use crate::websocket::fanout;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Run the listener until `shutdown` is cancelled, reconnecting on
/// connection loss.
pub async fn run(
    state: Arc<AppState>,
    url: String,
    channels: Vec<String>,
    shutdown: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match listen(&state, &url, &channels, &shutdown, &mut backoff).await {
            Ok(()) => return,
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = backoff.as_secs(),
                    "notification stream lost, reconnecting"
                );
            }
        }
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn listen(
    state: &AppState,
    url: &str,
    channels: &[String],
    shutdown: &CancellationToken,
    backoff: &mut Duration,
) -> sqlx::Result<()> {
    let mut listener = PgListener::connect(url).await?;
    listener
        .listen_all(channels.iter().map(String::as_str))
        .await?;
    info!(?channels, "listening for change notifications");
    *backoff = INITIAL_BACKOFF;

    loop {
        let notification = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            notification = listener.recv() => notification?,
        };
        handle_notification(state, notification.channel(), notification.payload()).await;
    }
}

/// Decode one NOTIFY payload and fan it out.
pub(crate) async fn handle_notification(state: &AppState, channel: &str, payload: &str) {
    let event: ChangeEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            counter!(NOTIFY_DECODE_FAILURES_TOTAL, "channel" => channel.to_string()).increment(1);
            warn!(channel, error = %e, "dropping undecodable notification payload");
            return;
        }
    };
    debug!(channel, event_type = %event.event_type, "notification received");
    fanout::route_event(state, &event).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
