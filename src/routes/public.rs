use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints whose paths are on the guard's allow-list, so they are reachable without a
/// session. Adding a route here without a matching allow-list entry makes it guarded.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /api/health
        // Liveness probe for load balancers. Never touches the store.
        .route("/api/health", get(|| async { "ok" }))
        // POST /api/auth/login
        // Issues the session token and sets the `session` cookie.
        .route("/api/auth/login", post(handlers::login))
        // POST /api/auth/logout
        // Expires the `session` cookie.
        .route("/api/auth/logout", post(handlers::logout))
}
