use provision_admin::{
    AppState,
    auth::hash_password,
    config::{AppConfig, Env},
    create_router,
    models::{Role, User},
    repository::{PostgresRepository, Repository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter, RUST_LOG first.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "provision_admin=debug,tower_http=info".into());

    // 3. Pretty output locally, JSON for the log aggregator in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    tracing::warn!(
        "session tokens are unsigned base64; deploy behind a signed or server-side session before exposing publicly"
    );

    // 4. Database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);

    // LOCAL-ONLY: create tables, seed the settings catalog and the bootstrap admin.
    if config.env == Env::Local {
        postgres
            .ensure_schema()
            .await
            .expect("FATAL: Failed to prepare the local schema.");

        if let Some(seed) = &config.seed_admin {
            let password_hash =
                hash_password(&seed.password).expect("FATAL: Failed to hash the seed password.");
            let admin = User {
                id: "local-admin".to_string(),
                email: seed.email.clone(),
                name: Some("Local Admin".to_string()),
                role: Role::SuperAdmin,
                password_hash,
            };
            postgres
                .upsert_user(&admin)
                .await
                .expect("FATAL: Failed to seed the admin account.");
            tracing::info!(email = %seed.email, "seed admin account ready");
        }
    }

    let repo = Arc::new(postgres) as RepositoryState;

    // 5. State and router
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated.");
}
