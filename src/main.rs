use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mws_api::config::{AppConfig, StoreBackend};
use mws_api::routes;
use mws_api::state::AppState;
use mws_api::store::{DocumentStore, MemoryStore, PgDocumentStore};

#[derive(Parser)]
#[command(name = "mws-api")]
#[command(about = "Session-scoped document store proxy")]
#[command(version)]
struct Args {
    #[arg(long, help = "Port to listen on (default: MWS_API_PORT, PORT, then 5000)")]
    port: Option<u16>,

    #[arg(long, default_value = "0.0.0.0", help = "Address to bind")]
    host: String,

    #[arg(long, help = "Store backend: postgres or memory")]
    store: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, MWS_COOKIE_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .init();

    let args = Args::parse();

    let mut config: AppConfig = mws_api::config::config().clone();
    if let Some(store) = args.store.as_deref() {
        config.store.backend = StoreBackend::parse(store).with_context(|| format!("unknown store backend {:?}", store))?;
    }
    config.validate()?;
    tracing::info!("Starting mws-api in {:?} mode", config.environment);

    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Postgres => Arc::new(
            PgDocumentStore::connect(&config.database)
                .await
                .context("failed to connect to PostgreSQL")?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Allow tests or deployments to override port via env
    let port = args
        .port
        .or_else(|| std::env::var("MWS_API_PORT").ok().and_then(|s| s.parse().ok()))
        .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(5000);

    let app = routes::app(AppState::new(store, config));

    let bind_addr = format!("{}:{}", args.host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("mws-api listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Shutting down");
    }
}
