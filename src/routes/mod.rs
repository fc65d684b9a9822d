pub mod admin;
pub mod health;
pub mod public;

use crate::middleware::{auth::require_admin, rate_limit::{rps_middleware, RateLimiter}};
use crate::models::audit_log::ClientInfo;
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header::USER_AGENT, HeaderMap},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub(crate) fn client_info(headers: &HeaderMap) -> ClientInfo {
    ClientInfo::new(
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    )
}

/// Every API route. Static file serving is added by the binary.
pub fn build_router(state: AppState) -> Router {
    let limiter = RateLimiter::new(state.public_rps);
    let body_limit = state.body_limit;

    let public_api = Router::new()
        .route("/api/public/candidates", post(public::submit_candidate))
        .route("/api/public/validate", post(public::validate_field))
        .route("/api/admin/login", post(admin::login))
        .layer(from_fn_with_state(limiter, rps_middleware));

    let admin_api = Router::new()
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/admin/candidates", get(admin::list_candidates))
        .route("/api/admin/candidates/stream", get(admin::stream_candidates))
        .route(
            "/api/admin/candidates/:id",
            get(admin::get_candidate).delete(admin::delete_candidate),
        )
        .route("/api/admin/candidates/:id/history", get(admin::candidate_history))
        .route("/api/admin/candidates/:id/status", post(admin::update_status))
        .route("/api/admin/notifications", get(admin::list_notifications))
        .route(
            "/api/admin/sync",
            get(admin::sync_status).post(admin::force_sync),
        )
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health::health))
        .merge(public_api)
        .merge(admin_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}
