//! HTTP surface: router assembly and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;
use crate::websocket::connection::ws_handler;

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        .route("/realtime", get(ws_handler))
        .route("/health", get(health_handler));
    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || std::future::ready(crate::metrics::render(&handle))),
        );
    }
    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn run(
    state: Arc<AppState>,
    metrics: Option<PrometheusHandle>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = format!(
        "{}:{}",
        state.settings.server.bind, state.settings.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "relay gateway listening");

    let router = build_router(state, metrics);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.registry.connection_count(),
        "topics": state.registry.topic_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubAuthority, make_connection};
    use relay_auth::Authority;
    use relay_settings::RelaySettings;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(StubAuthority::allow_all()) as Arc<dyn Authority>,
            Arc::new(RelaySettings::default()),
            None,
        ))
    }

    #[test]
    fn build_router_creates_routes() {
        let _router = build_router(state(), None);
    }

    #[tokio::test]
    async fn health_reports_registry_counts() {
        let state = state();
        let (conn, _rx) = make_connection("a");
        let id = conn.id.clone();
        let _ = state.registry.insert(conn);
        assert!(state.registry.subscribe(&id, "table:orders"));

        let Json(body) = health_handler(State(Arc::clone(&state))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 1);
        assert_eq!(body["topics"], 1);
    }
}
