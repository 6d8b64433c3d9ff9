//! Process entry point: pool, migrations, dispatcher, HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use mesh_core::agent::http::HttpConversationAgent;
use mesh_core::database::{DatabaseConnection, DatabaseMigrations};
use mesh_core::ingestion::InboundProcessor;
use mesh_core::logging::init_logging;
use mesh_core::outreach::OutreachDispatcher;
use mesh_core::transport::HttpMessageTransport;
use mesh_core::web::{build_router, AppState};
use mesh_core::MeshConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Arc::new(MeshConfig::load().context("loading configuration")?);

    let connection = DatabaseConnection::new(&config.database)
        .await
        .context("connecting to database")?;
    let pool = connection.pool().clone();
    DatabaseMigrations::run_all(&pool)
        .await
        .context("running migrations")?;

    let agent = Arc::new(HttpConversationAgent::new(&config.agent)?);
    let transport = Arc::new(HttpMessageTransport::new(&config.transport)?);

    let processor = Arc::new(InboundProcessor::new(
        pool.clone(),
        agent.clone(),
        transport.clone(),
        config.agent.max_concurrent_calls,
    ));

    let dispatcher = Arc::new(OutreachDispatcher::new(
        pool.clone(),
        agent,
        transport,
        config.outreach.clone(),
    ));
    let dispatcher_handle = dispatcher.start();

    let state = AppState::new(pool, processor, config.clone());
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("binding {}", config.web.bind_address))?;
    info!(address = %config.web.bind_address, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    dispatcher_handle.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
