use crate::{AppState, handlers, middleware::TEACHERS_ONLY};
use axum::{
    Router,
    routing::{get, post},
};

use super::protect;

/// Teacher Router Module
///
/// Chain: Authentication -> Role{teacher}. There is no ownership stage, so any teacher
/// may manage any teacher record and any roster.
pub fn teacher_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        // GET/PUT/DELETE /teachers/{id}
        .route(
            "/teachers/{id}",
            get(handlers::get_teacher)
                .put(handlers::update_teacher)
                .delete(handlers::delete_teacher),
        )
        // GET /teachers/{id}/students
        .route("/teachers/{id}/students", get(handlers::get_teacher_students))
        // POST /teachers/{id}/students/{student_id}
        // Assigning the same student twice is a no-op.
        .route(
            "/teachers/{id}/students/{student_id}",
            post(handlers::assign_student),
        );

    protect(routes, state, TEACHERS_ONLY)
}
