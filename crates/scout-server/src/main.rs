use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use scout_client::build_strategies;
use scout_core::{MemoryStore, ScrapeOrchestrator, ScraperConfig};
use scout_db::{Database, DatabaseConfig};
use scout_server::routes;
use scout_server::state::{AppState, Storage};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scout=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("SCOUT_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = ScraperConfig::from_env()?;
    let strategies = build_strategies(&config).await?;

    let (storage, database) = match DatabaseConfig::from_env()? {
        Some(db_config) => {
            let db = Database::connect(&db_config).await?;
            db.migrate().await?;
            (Storage::Postgres(db.record_repo()), Some(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; scraped records are kept in memory");
            (Storage::Memory(MemoryStore::new()), None)
        }
    };
    tracing::info!(storage = storage.name(), "Record storage ready");

    let orchestrator = ScrapeOrchestrator::new(strategies, storage, &config)?;
    let mut state = AppState::new(orchestrator.clone());
    if let Some(db) = database {
        state = state.with_database(db);
    }

    let app = routes::router(Arc::new(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    let aborter = orchestrator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(move || aborter.begin_shutdown()))
        .await?;

    orchestrator.shutdown().await;
    Ok(())
}

/// Resolves on CTRL+C after running `on_signal`, so running jobs are aborted
/// before axum starts draining their requests.
async fn shutdown_signal(on_signal: impl FnOnce()) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    on_signal();
}
