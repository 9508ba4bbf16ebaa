use axum::Router;

use sitewatch_application::AppState;

use crate::handlers::{ops_handlers, stream_handlers, watch_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/watchlist",
            axum::routing::get(watch_handlers::list_watchlist)
                .post(watch_handlers::flag_user),
        )
        .route(
            "/api/v1/watchlist/alerts",
            axum::routing::get(watch_handlers::recent_alerts),
        )
        .route(
            "/api/v1/watchlist/:user_id",
            axum::routing::patch(watch_handlers::update_watch_entry)
                .delete(watch_handlers::unflag_user),
        )
        .route(
            "/api/v1/monitoring/stream",
            axum::routing::get(stream_handlers::monitoring_stream),
        )
        .route("/health/live", axum::routing::get(ops_handlers::health_live))
        .route(
            "/health/ready",
            axum::routing::get(ops_handlers::health_ready),
        )
        .route(
            "/metrics",
            axum::routing::get(ops_handlers::metrics_prometheus),
        )
        .with_state(state)
}
