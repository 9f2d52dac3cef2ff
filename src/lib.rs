use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
};

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Token verification/issuing, identity types and password hashing.
pub mod auth;
pub mod config;
pub mod documents;
pub mod errors;
// Extractors that reject with `ApiError`.
pub mod extract;
pub mod handlers;
// The Authentication -> Role -> Ownership chain.
pub mod middleware;
pub mod models;
pub mod repository;
pub mod storage;

// Route groups, one per middleware chain.
pub mod routes;
use routes::{account, public, storage as storage_routes, students, teachers};

// --- Public Re-exports ---

pub use auth::{TokenIssuer, TokenVerifier};
pub use config::AppConfig;
pub use documents::{DocumentStorageState, InMemoryDocumentStorage, PostgresDocumentStorage};
pub use errors::ApiError;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{FileStorageState, InMemoryFileStorage, S3FileStorage};

/// AppState
///
/// The single, immutable container shared by every request. The token keys are derived
/// from the configured secret once, here, and never again.
#[derive(Clone)]
pub struct AppState {
    /// Students, teachers and assignments (Postgres).
    pub repo: RepositoryState,
    /// Uploaded files (S3/MinIO).
    pub files: FileStorageState,
    /// Schemaless JSON documents.
    pub documents: DocumentStorageState,
    pub config: AppConfig,
    pub verifier: Arc<TokenVerifier>,
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(
        repo: RepositoryState,
        files: FileStorageState,
        documents: DocumentStorageState,
        config: AppConfig,
    ) -> Self {
        let verifier = Arc::new(TokenVerifier::new(&config.jwt_secret));
        let issuer = Arc::new(TokenIssuer::new(&config.jwt_secret, config.jwt_ttl));
        Self {
            repo,
            files,
            documents,
            config,
            verifier,
            issuer,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for FileStorageState {
    fn from_ref(app_state: &AppState) -> FileStorageState {
        app_state.files.clone()
    }
}

impl FromRef<AppState> for DocumentStorageState {
    fn from_ref(app_state: &AppState) -> DocumentStorageState {
        app_state.documents.clone()
    }
}

/// create_router
///
/// Assembles the route tree under `/api/v1`, attaches each group's middleware chain and
/// wraps everything in the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Each group carries its own chain; public routes carry none.
    let api = Router::new()
        .merge(public::public_routes())
        .merge(account::account_routes(&state))
        .merge(students::student_routes(&state))
        .merge(teachers::teacher_routes(&state))
        .merge(storage_routes::storage_routes(&state));

    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    let base_router = Router::new()
        .nest("/api/v1", api)
        .layer(body_limit)
        .with_state(state);

    base_router
        .layer(
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
                // Echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`. Every log line emitted while serving a request,
/// including the middleware rejections, carries the request ID.
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
