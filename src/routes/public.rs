use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. Login is the only way to obtain one.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Used by load balancers; never touches the database.
        .route("/health", get(handlers::health))
        // POST /students, POST /students/login
        .route("/students", post(handlers::register_student))
        .route("/students/login", post(handlers::login_student))
        // POST /teachers, POST /teachers/login
        .route("/teachers", post(handlers::register_teacher))
        .route("/teachers/login", post(handlers::login_teacher))
}
