use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render));

    // Engine API
    let api = Router::new()
        // Signals
        .route("/api/signals", post(handlers::signals::ingest))
        .route("/api/signals/:master_trade_id", get(handlers::signals::detail))
        // Relationships
        .route(
            "/api/relationships",
            get(handlers::relationships::list).post(handlers::relationships::follow),
        )
        .route("/api/relationships/:id", get(handlers::relationships::detail))
        .route("/api/relationships/:id/resume", post(handlers::relationships::resume))
        .route("/api/relationships/:id/pause", post(handlers::relationships::pause))
        .route("/api/relationships/:id/stop", post(handlers::relationships::stop))
        .route("/api/relationships/:id/unfollow", post(handlers::relationships::unfollow))
        // Sessions
        .route("/api/sessions", get(handlers::sessions::list))
        .route("/api/sessions/:id", get(handlers::sessions::detail))
        // Analytics
        .route("/api/analytics/performance", get(handlers::analytics::performance));

    // CORS: dashboard is served from its own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
