use anyhow::Context;
use ppi_core::config::AppConfig;
use ppi_server::{router, RetrievalService};
use query::QueryEngine;
use std::sync::Arc;
use storage::{FsContactStore, Repository, StorePool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ppi_core::init_tracing();

    let config = AppConfig::load().context("invalid configuration")?;

    let repo = Arc::new(
        Repository::open(&config.database.wal_path)
            .await
            .with_context(|| format!("failed to open store at {}", config.database.wal_path.display()))?,
    );
    let pool = StorePool::new(
        repo,
        config.pool.max_connections,
        config.pool.acquire_timeout(),
    );
    let contacts = Arc::new(FsContactStore::new(&config.contacts.root));
    tracing::info!(
        contacts = %contacts.dir().display(),
        max_connections = pool.max_connections(),
        "store ready"
    );

    let service = Arc::new(RetrievalService::new(QueryEngine::new(pool.clone()), contacts));
    let app = router(service);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close();
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
