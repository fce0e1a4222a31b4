//! Pontoon API server binary
//!
//! Wires storage, caches, and the game service together and serves the
//! HTTP API until shutdown.

use clap::Parser;
use pontoon::api::cache::TableCache;
use pontoon::api::handlers::AppState;
use pontoon::api::server::{ApiConfig, ApiServer};
use pontoon::config::PontoonConfig;
use pontoon::game::advisor::BasicStrategyAdvisor;
use pontoon::game::deck::InfiniteDeck;
use pontoon::game::service::GameService;
use pontoon::metrics::MetricsRegistry;
use pontoon::record_store::RecordStore;
use pontoon::storage::Storage;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pontoon")]
#[command(about = "Pontoon Blackjack API Server", long_about = None)]
struct Args {
    /// API server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// API server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Configuration file (TOML). CLI flags override file values.
    #[arg(long)]
    config: Option<String>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pontoon=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PontoonConfig::load_from_file(path)?,
        None => PontoonConfig::default(),
    };
    if let Some(db_path) = &args.db_path {
        config.storage.data_directory = db_path.clone();
    }
    config.validate()?;

    info!("📂 Opening record database: {}", config.storage.data_directory);
    let storage = Storage::open(&config.storage)?;
    info!("✅ Database opened successfully");

    let store = RecordStore::new(storage);
    let metrics = MetricsRegistry::new();
    let cache = Arc::new(TableCache::new(&config.cache, metrics.clone()));
    TableCache::start_cleanup_task(cache.clone(), config.cache_cleanup_interval());

    let service = GameService::new(
        &config,
        store,
        cache,
        metrics.clone(),
        Arc::new(InfiniteDeck::new()),
        Arc::new(BasicStrategyAdvisor),
    );

    let allowed_origins: Vec<String> = args
        .cors_origins
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    let api_config = ApiConfig {
        host: args.host,
        port: args.port,
        allowed_origins,
        request_timeout_secs: args.timeout,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let state = Arc::new(AppState { service, metrics });
    let server = ApiServer::new(api_config, state);
    server.run().await?;

    Ok(())
}
