//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let router = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::node_status))
        // Registration and queries
        .route("/registry/apps", get(handlers::get_all_instances))
        .route("/registry/apps/:service", post(handlers::register_instance))
        .route("/registry/apps/:service", get(handlers::get_service_instances))
        .route(
            "/registry/apps/:service/:instance_id/renew",
            put(handlers::renew_lease),
        )
        .route(
            "/registry/apps/:service/:instance_id/status",
            put(handlers::update_instance_status),
        )
        .route(
            "/registry/apps/:service/:instance_id",
            delete(handlers::cancel_lease),
        )
        // Peer replication
        .route("/peer/events", post(handlers::apply_replication_event))
        .route("/peer/snapshot", get(handlers::get_lease_snapshot))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
