use crate::{AppState, handlers, middleware::STUDENTS_AND_TEACHERS};
use axum::{Router, routing::get};

use super::protect;

/// Storage Router Module
///
/// Files (S3) and schemaless documents. Chain: Authentication -> Role{student, teacher}.
pub fn storage_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        // GET /files, POST /files (multipart, field `file`)
        .route("/files", get(handlers::list_files).post(handlers::upload_file))
        // GET /files/{id} downloads the bytes, DELETE /files/{id} removes the object.
        .route(
            "/files/{id}",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        // GET /documents?type=..., POST /documents
        .route(
            "/documents",
            get(handlers::list_documents).post(handlers::create_document),
        )
        // GET/PUT/DELETE /documents/{id}
        .route(
            "/documents/{id}",
            get(handlers::get_document)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        );

    protect(routes, state, STUDENTS_AND_TEACHERS)
}
