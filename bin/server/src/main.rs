use kelasi_ai::GeminiBackend;
use kelasi_credits::PgCreditLedger;
use kelasi_server::{
    app::{self, AppState},
    auth::{self, PgSessionStore, SessionStore},
    config::ServerConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(
        model = %config.generation.model,
        language = %config.generation.language,
        payments_enabled = config.payment.is_some(),
        "Loaded configuration"
    );

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(db_pool.clone()));
    auth::cleanup_expired(sessions.as_ref(), "startup").await;

    // Spawn periodic session cleanup task
    let cleanup_store = Arc::clone(&sessions);
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            auth::cleanup_expired(cleanup_store.as_ref(), "periodic").await;
        }
    });

    let backend = GeminiBackend::new(config.generation.backend_config())
        .expect("invalid generation backend configuration");
    let ledger = PgCreditLedger::new(db_pool);

    let state = Arc::new(AppState::new(
        &config,
        sessions,
        Arc::new(ledger),
        Arc::new(backend),
    ));
    let app = app::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}
