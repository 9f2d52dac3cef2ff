use crate::{AppState, handlers, middleware::require_auth};
use axum::{Router, middleware, routing::get};

/// Account Router Module
///
/// Any valid token is enough here, with or without a role claim.
pub fn account_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // GET /me
        // Returns the identity resolved from the caller's token.
        .route("/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            require_auth,
        ))
}
