//! # HTTP Surface
//!
//! The inbound webhook plus the synchronous campaign management API.

pub mod errors;
pub mod handlers;
pub mod state;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .web
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
        .allow_origin(origins);

    Router::new()
        .route(
            "/campaigns",
            post(handlers::campaigns::create_campaign).get(handlers::campaigns::list_campaigns),
        )
        .route("/campaigns/{campaign_id}", get(handlers::campaigns::get_campaign))
        .route(
            "/campaigns/{campaign_id}/launch",
            post(handlers::campaigns::launch_campaign),
        )
        .route(
            "/campaigns/{campaign_id}/pause",
            post(handlers::campaigns::pause_campaign),
        )
        .route(
            "/campaigns/{campaign_id}/conversations",
            get(handlers::conversations::list_conversations),
        )
        .route(
            "/campaigns/{campaign_id}/extractions",
            get(handlers::campaigns::get_extractions),
        )
        .route(
            "/conversations/{conversation_id}",
            get(handlers::conversations::get_conversation),
        )
        .route("/webhooks/inbound", post(handlers::webhook::inbound))
        .route("/health", get(handlers::health::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
