use std::sync::Arc;

use anyhow::Context;

use stockledger_api::{app, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load().context("failed to load configuration")?;
    stockledger_observability::tracing::init(&config.log);

    tracing::info!(
        environment = %config.environment,
        backend = ?config.store.backend,
        "starting stock ledger"
    );

    let services = Arc::new(app::services::build_services(&config).await?);
    let router = app::build_app(services);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router).await?;
    Ok(())
}
