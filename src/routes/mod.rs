//! Router Module Index
//!
//! Routes are grouped by the middleware chain they need. Each group builds its own
//! `Router<AppState>` and attaches its chain with `route_layer`, so the checks only run
//! for requests that actually matched one of the group's routes.

use axum::{Router, middleware};

use crate::{
    AppState,
    middleware::{RoleGuard, require_auth, require_role},
};

/// Registration, login and the health check.
pub mod public;

/// `/me`: authentication only, no role requirement.
pub mod account;

/// `/students/{id}`: authentication, role and ownership.
pub mod students;

/// Teacher management and assignments, teachers only.
pub mod teachers;

/// Files and documents, open to any authenticated student or teacher.
pub mod storage;

/// protect
///
/// Wraps a route group in Authentication followed by the role check. With `route_layer`
/// the layer added last runs first, so authentication is added after the role check.
/// Any layer the caller has already applied (ownership) ends up innermost.
pub(crate) fn protect(routes: Router<AppState>, state: &AppState, guard: RoleGuard) -> Router<AppState> {
    routes
        .route_layer(middleware::from_fn_with_state(guard, require_role))
        .route_layer(middleware::from_fn_with_state(
            state.verifier.clone(),
            require_auth,
        ))
}
