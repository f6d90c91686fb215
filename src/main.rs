//! Driver Reconciler — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the engine state, routes and metrics.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use driver_reconciler::backend::HttpBackend;
use driver_reconciler::config::AppConfig;
use driver_reconciler::metrics::Metrics;
use driver_reconciler::workflow::Reconciler;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("driver_reconciler=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load()?;
    tracing::info!(backend = %cfg.backend_base_url, scope = %cfg.scope_id, "starting");

    let metrics = Metrics::init();

    let backend = HttpBackend::new(&cfg.backend_base_url);
    let mut reconciler = Reconciler::new(backend, &cfg.scope_id);

    // Initial load of the unmatched pools; fetch failures land in the
    // state's error slot rather than aborting startup.
    reconciler.reload_all().await;

    let app = driver_reconciler::create_router(reconciler).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
