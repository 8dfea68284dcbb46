use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Session tokens, password hashing and the downstream identity extractor.
pub mod auth;
pub mod config;
pub mod error;
// The access guard deciding every request before it reaches a handler.
pub mod guard;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod settings;

// Route groups (public allow-list vs. admin API).
pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

pub use config::{AppConfig, GuardConfig};
pub use guard::AccessGuard;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the dashboard API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout, handlers::get_me,
        handlers::get_settings, handlers::update_setting, handlers::reset_settings
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::LoginRequest, models::LoginResponse,
            models::SessionIdentity, models::SettingType, models::SystemSetting,
            models::UpdateSettingRequest,
        )
    ),
    tags(
        (name = "provision-admin", description = "Log analysis admin API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// User and settings stores.
    pub repo: RepositoryState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
    /// The access guard, built from `config` and sharing `repo` as its user store.
    pub guard: AccessGuard,
}

impl AppState {
    /// new
    ///
    /// Assembles the state and wires the guard to the same repository the handlers use.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let guard = AccessGuard::new(config.guard_config(), repo.clone());
        Self { repo, config, guard }
    }
}

// --- Axum FromRef Extractor Implementations ---

// The guard middleware extracts only its own state.
impl FromRef<AppState> for AccessGuard {
    fn from_ref(app_state: &AppState) -> AccessGuard {
        app_state.guard.clone()
    }
}

/// create_router
///
/// Assembles the routes, wraps all of them (fallback included) in the access guard, and
/// applies the observability layers outside the guard so denials are logged inside the
/// request span.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(admin::admin_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::access_guard,
        ))
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Builds the per-request span, tagging it with the `x-request-id` so every log line of a
/// request (including guard denials) can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
