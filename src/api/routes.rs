//! Route definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))

        // Game table actions
        .route("/api/game/deal", post(deal_handler))
        .route("/api/game/hit", post(hit_handler))
        .route("/api/game/stand", post(stand_handler))
        .route("/api/game/dealer-card", post(dealer_card_handler))
        .route("/api/game/active", get(active_game_handler))
        .route("/api/game/hint", post(hint_handler))
        .route("/api/game/heartbeat", post(heartbeat_handler))

        // Chip economy
        .route("/api/user/balance", get(balance_handler))
        .route("/api/user/buy-chips", post(buy_chips_handler))

        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))

        // Attach shared state
        .with_state(state)
}
