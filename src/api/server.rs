//! API server
//!
//! Server setup and the middleware stack. `create_app` is separate from
//! `ApiServer` so tests can drive the router without binding a socket.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware, track_metrics},
    routes::create_router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the application with the full middleware stack.
pub fn create_app(state: Arc<AppState>, config: &ApiConfig) -> axum::Router {
    let metrics = state.metrics.clone();

    create_router(state)
        // Request ID middleware (first for tracing)
        .layer(axum::middleware::from_fn(request_id_middleware))

        // Request timing into the metrics registry
        .layer(axum::middleware::from_fn_with_state(metrics, track_metrics))

        // CORS layer (before timeout to handle preflight)
        .layer(create_cors_layer(config.allowed_origins.clone()))

        // Timeout layer
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))

        // Tracing layer (last for complete request tracing)
        .layer(TraceLayer::new_for_http())
}

/// The HTTP front of the table service
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = create_app(self.state.clone(), &self.config);
        let addr = self.get_socket_addr()?;

        info!("🚀 Starting Pontoon API Server");
        info!("   Listen: http://{}", addr);
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API server running");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("🛑 API server stopped gracefully");
        Ok(())
    }

    /// Get socket address from config
    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    /// Log server information
    fn log_server_info(&self) {
        info!("📋 Server Configuration:");
        info!("   Version: {}", self.config.version);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);

        info!("📊 Available endpoints:");
        info!("   GET  /health               - Health check");
        info!("   GET  /metrics              - Prometheus metrics");
        info!("   POST /api/game/deal        - Place a bet and deal");
        info!("   POST /api/game/hit         - Draw a card");
        info!("   POST /api/game/stand       - Stand");
        info!("   POST /api/game/dealer-card - Advance the dealer");
        info!("   GET  /api/game/active      - Current game");
        info!("   POST /api/game/hint        - Strategy advice");
        info!("   POST /api/game/heartbeat   - Keep session warm");
        info!("   GET  /api/user/balance     - Balance and stats");
        info!("   POST /api/user/buy-chips   - Buy chips");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
