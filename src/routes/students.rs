use crate::{
    AppState, handlers,
    middleware::{OwnershipGuard, STUDENTS_AND_TEACHERS, require_ownership},
};
use axum::{Router, middleware, routing::get};

use super::protect;

/// Student Router Module
///
/// Chain: Authentication -> Role{student, teacher} -> Ownership(`id`).
/// A student may only read their own record; teachers may read any.
pub fn student_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        // GET /students/{id}
        .route("/students/{id}", get(handlers::get_student))
        .route_layer(middleware::from_fn_with_state(
            OwnershipGuard::path_param("id"),
            require_ownership,
        ));

    protect(routes, state, STUDENTS_AND_TEACHERS)
}
