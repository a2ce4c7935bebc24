//! Gateway binary entry point.

use std::sync::Arc;

use anyhow::Context;
use relay_auth::{Authority, AuthorityClient};
use relay_server::mirror::ConnectionMirror;
use relay_server::state::AppState;
use relay_server::{app, listener, metrics, sweeper};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = relay_settings::get_settings();
    relay_core::logging::init(&settings.logging.level, settings.logging.json);
    let metrics_handle = metrics::install_recorder();

    let authority =
        AuthorityClient::new(&settings.authority.base_url, settings.authority.timeout())
            .context("building authority client")?;

    let mirror = match &settings.database.url {
        Some(url) => Some(
            ConnectionMirror::connect(url)
                .await
                .context("connecting to the mirror database")?,
        ),
        None => None,
    };

    let state = Arc::new(AppState::new(
        Arc::new(authority) as Arc<dyn Authority>,
        Arc::clone(&settings),
        mirror,
    ));

    let shutdown = CancellationToken::new();

    if let Some(url) = settings.database.url.clone() {
        let channels = vec![
            settings.database.changes_channel.clone(),
            settings.database.broadcast_channel.clone(),
        ];
        let _ = tokio::spawn(listener::run(
            Arc::clone(&state),
            url,
            channels,
            shutdown.clone(),
        ));
    } else {
        tracing::info!("no database configured, change listener and mirror disabled");
    }
    let _ = tokio::spawn(sweeper::run_heartbeat_sweep(
        Arc::clone(&state),
        shutdown.clone(),
    ));
    let _ = tokio::spawn(sweeper::run_cleanup(Arc::clone(&state), shutdown.clone()));

    let signal = shutdown.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal.cancel();
        }
    });

    app::run(state, Some(metrics_handle), shutdown)
        .await
        .context("serving")?;
    Ok(())
}
