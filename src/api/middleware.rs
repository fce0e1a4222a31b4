//! Middleware components
//!
//! CORS, request tracking, player identification, and request timing.

use std::time::Instant;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderName, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::metrics::MetricsRegistry;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header identifying the player behind a game or user route
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.contains(&"*".to_string()) {
        // Development mode: allow all origins
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(
                REQUEST_ID_HEADER,
            )]))
    } else {
        // Production mode: specific origins
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers(ExposeHeaders::list([HeaderName::from_static(
                REQUEST_ID_HEADER,
            )]))
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    // Reuse a client-supplied ID so traces line up across services.
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Middleware that times every request into the metrics registry.
pub async fn track_metrics(
    State(metrics): State<MetricsRegistry>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let success = !response.status().is_server_error();
    metrics.record_http_request(start.elapsed(), success).await;
    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn from_parts(parts: &Parts) -> String {
        parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// The player behind a request, read from `x-player-id`. Game and user
/// routes refuse to run without it.
#[derive(Debug, Clone)]
pub struct PlayerId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PlayerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let player = parts
            .headers
            .get(PLAYER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match player {
            Some(id) => Ok(PlayerId(id.to_string())),
            None => Err(ApiError::bad_request(
                RequestId::from_parts(parts),
                format!("Missing {} header", PLAYER_ID_HEADER),
            )),
        }
    }
}
