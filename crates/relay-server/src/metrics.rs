//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Handshake rejections total (counter, labels: reason).
pub const HANDSHAKE_REJECTIONS_TOTAL: &str = "handshake_rejections_total";
/// Client messages received total (counter, labels: event).
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// Subscribe denials total (counter).
pub const SUBSCRIBE_DENIALS_TOTAL: &str = "subscribe_denials_total";
/// Topics with at least one subscriber (gauge).
pub const TOPICS_ACTIVE: &str = "topics_active";
/// Fan-out deliveries total (counter).
pub const FANOUT_DELIVERIES_TOTAL: &str = "fanout_deliveries_total";
/// Fan-out recipients vetoed by the filter (counter).
pub const FANOUT_FILTERED_TOTAL: &str = "fanout_filtered_total";
/// Fan-out frames dropped on a full outbound channel (counter).
pub const FANOUT_DROPS_TOTAL: &str = "fanout_drops_total";
/// Fan-out wall time per event (histogram).
pub const FANOUT_DURATION_SECONDS: &str = "fanout_duration_seconds";
/// Notification payloads that failed to decode (counter, labels: channel).
pub const NOTIFY_DECODE_FAILURES_TOTAL: &str = "notify_decode_failures_total";
/// Change events with no derivable topic (counter).
pub const NOTIFY_UNDELIVERABLE_TOTAL: &str = "notify_undeliverable_total";
/// Authority call duration seconds (histogram, labels: operation).
pub const AUTHORITY_REQUEST_DURATION_SECONDS: &str = "authority_request_duration_seconds";
