//! Request handlers
//!
//! Thin translations between HTTP and the game service. Every game rule
//! lives in the service; handlers only shape requests and responses.

use super::{
    errors::ApiError,
    middleware::{PlayerId, RequestId},
    models::*,
};
use crate::game::advisor::Advice;
use crate::game::engine::DealerPlay;
use crate::game::service::GameService;
use crate::metrics::MetricsRegistry;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: GameService,
    pub metrics: MetricsRegistry,
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Prometheus exposition text
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.to_prometheus_format().await
}

/// Take the stake and deal a new hand
/// POST /api/game/deal
pub async fn deal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<DealRequest>,
) -> Result<Json<GameView>, ApiError> {
    let game = state
        .service
        .place_bet(&player.0, body.bet_amount)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(GameView::from(&game)))
}

/// Draw one card for the player
/// POST /api/game/hit
pub async fn hit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<GameActionRequest>,
) -> Result<Json<GameView>, ApiError> {
    let game = state
        .service
        .hit(&body.game_id, &player.0)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(GameView::from(&game)))
}

/// Lock the player total and reveal the hole card
/// POST /api/game/stand
pub async fn stand_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<GameActionRequest>,
) -> Result<Json<GameView>, ApiError> {
    let game = state
        .service
        .stand(&body.game_id, &player.0)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(GameView::from(&game)))
}

/// Advance the dealer turn, one card or to completion
/// POST /api/game/dealer-card
pub async fn dealer_card_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<DealerCardRequest>,
) -> Result<Json<DealerStepResponse>, ApiError> {
    let mode = if body.to_completion {
        DealerPlay::ToCompletion
    } else {
        DealerPlay::OneCard
    };
    let outcome = state
        .service
        .dealer_step(&body.game_id, &player.0, mode)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;

    Ok(Json(DealerStepResponse {
        game: GameView::from(&outcome.game),
        needs_more_cards: outcome.needs_more_cards,
        game_complete: outcome.game_complete,
        new_balance: outcome.new_balance,
    }))
}

/// The caller's current game, if any
/// GET /api/game/active
pub async fn active_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
) -> Result<Json<ActiveGameResponse>, ApiError> {
    let game = state
        .service
        .active_game(&player.0)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;

    Ok(Json(ActiveGameResponse {
        active: game.is_some(),
        game: game.as_ref().map(GameView::from),
    }))
}

/// Basic-strategy advice for the current hand
/// POST /api/game/hint
pub async fn hint_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<GameActionRequest>,
) -> Result<Json<Advice>, ApiError> {
    let advice = state
        .service
        .hint(&body.game_id, &player.0)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(advice))
}

/// Keep a live session's cache rows warm
/// POST /api/game/heartbeat
pub async fn heartbeat_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<GameActionRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    state
        .service
        .heartbeat(&body.game_id, &player.0)
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(HeartbeatResponse { refreshed: true }))
}

/// Balance and lifetime stats, creating the profile on first touch
/// GET /api/user/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
) -> Result<Json<BalanceResponse>, ApiError> {
    let profile = state
        .service
        .profile(&player.0)
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(BalanceResponse::from(&profile)))
}

/// Credit purchased chips
/// POST /api/user/buy-chips
pub async fn buy_chips_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    player: PlayerId,
    Json(body): Json<BuyChipsRequest>,
) -> Result<Json<BuyChipsResponse>, ApiError> {
    let balance = state
        .service
        .buy_chips(&player.0, body.amount)
        .await
        .map_err(|e| ApiError::new(request_id.0, e))?;
    Ok(Json(BuyChipsResponse { balance }))
}
