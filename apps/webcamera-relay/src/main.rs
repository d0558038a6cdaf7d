use anyhow::Context;
use clap::Parser;
use tracing::info;

use webcamera_relay::config::{Cli, RelayConfig};
use webcamera_relay::routes;
use webcamera_relay::state::RelayService;
use webcamera_relay::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = RelayConfig::from(Cli::parse());
    init_tracing(&cfg.log_filter);

    let service = RelayService::start(&cfg);
    let app = routes::router(service.state());

    info!(
        addr = %cfg.bind_addr,
        max_streams = cfg.registry.max_entries,
        stream_ttl_secs = cfg.registry.ttl.as_secs(),
        sweep_interval_secs = cfg.sweep_interval.as_secs(),
        "starting webcamera-relay"
    );
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
