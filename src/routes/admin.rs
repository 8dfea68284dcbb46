use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// The settings API behind the dashboard. Every path here is under `/api/`, so requests
/// that reach a handler carry the `x-user-id` / `x-user-role` headers set by the guard and
/// handlers can take `AuthUser` directly.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/me
        // Identity of the current session, as resolved by the guard.
        .route("/api/me", get(handlers::get_me))
        // GET /api/settings, PUT /api/settings
        // Read all settings by category; replace one setting's value.
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::update_setting),
        )
        // POST /api/settings/reset
        // Writes the factory values back.
        .route("/api/settings/reset", post(handlers::reset_settings))
}
