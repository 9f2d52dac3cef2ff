use classroom_api::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    documents::{DocumentStorageState, PostgresDocumentStorage},
    repository::{PostgresRepository, RepositoryState},
    storage::{FileStorageState, S3FileStorage},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads the configuration, sets up logging, connects Postgres and S3, and serves the
/// router.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // RUST_LOG wins over the default filter.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "classroom_api=debug,tower_http=info".into());

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

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool.clone());
    postgres
        .apply_schema()
        .await
        .expect("FATAL: Failed to apply sql/schema.sql.");

    let repo = Arc::new(postgres) as RepositoryState;
    let documents = Arc::new(PostgresDocumentStorage::new(pool)) as DocumentStorageState;

    let s3 = S3FileStorage::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    );

    // LOCAL-ONLY: create the MinIO bucket on first run.
    if config.env == Env::Local {
        s3.ensure_bucket_exists().await;
    }

    let files = Arc::new(s3) as FileStorageState;

    let http_addr = config.http_addr.clone();
    let app = create_router(AppState::new(repo, files, documents, config));

    let listener = TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {http_addr}: {e}"));

    tracing::info!("Listening on {http_addr}");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server error");
}
