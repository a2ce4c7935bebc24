//! Background schedulers: heartbeat sweep and external-state cleanup.
//!
//! The sweep enforces liveness for this process's registry; cleanup
//! keeps the durable mirror honest about connections whose instance
//! died without tearing down. Both loops run until shutdown and treat a
//! failed cycle as a log line, not a crash.

use std::sync::Arc;
use std::time::Duration;

use relay_core::envelope::close_code;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::websocket::connection::teardown;

/// Periodically close connections that stopped heartbeating, and
/// refresh the mirror rows of those still alive.
pub async fn run_heartbeat_sweep(state: Arc<AppState>, shutdown: CancellationToken) {
    let mut ticker = interval(state.settings.heartbeat.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timeout = state.settings.heartbeat.timeout();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let expired = sweep_once(&state, timeout);
        if expired > 0 {
            info!(expired, "closed unresponsive connections");
        }

        if let Some(mirror) = &state.mirror {
            let ids = state.registry.connection_ids();
            if let Err(e) = mirror.refresh_heartbeats(&ids).await {
                debug!(error = %e, "mirror heartbeat refresh failed");
            }
        }
    }
}

/// One sweep pass: force-close every connection whose heartbeat is
/// older than `timeout`. Returns the number closed.
pub(crate) fn sweep_once(state: &AppState, timeout: Duration) -> usize {
    let expired = state.registry.expired(timeout);
    let count = expired.len();
    for conn in expired {
        warn!(
            connection_id = %conn.id,
            silent_secs = conn.heartbeat_age().as_secs(),
            "heartbeat timeout"
        );
        conn.close(close_code::HEARTBEAT_TIMEOUT, "heartbeat timeout");
        teardown(state, &conn, "heartbeat_timeout");
    }
    count
}

/// Periodically purge stale mirror rows. Exits immediately when no
/// mirror is configured.
pub async fn run_cleanup(state: Arc<AppState>, shutdown: CancellationToken) {
    let Some(mirror) = state.mirror.clone() else {
        return;
    };
    let retention = Duration::from_secs(state.settings.cleanup.retention_secs);
    let mut ticker = interval(state.settings.cleanup.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if let Err(e) = mirror.purge_stale(retention).await {
            warn!(error = %e, "mirror cleanup cycle failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
