use axum::{
    Json,
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    auth::TokenError, documents::DocumentError, repository::RepositoryError,
    storage::StorageError,
};

/// ApiError
///
/// Every failure a request can end in. Authentication and authorization rejections are
/// produced by the middleware chain; the remaining variants come from handlers. The
/// `Display` text is exactly what the client sees, so token failures never reveal which
/// check failed and internal details stay in the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authorization header is required")]
    MissingCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("role not found")]
    MissingRoleClaim,
    #[error("insufficient privileges")]
    InsufficientRole,
    #[error("you can only access your own resources")]
    OwnershipViolation,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCredentials
            | ApiError::InvalidToken
            | ApiError::MissingRoleClaim
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientRole | ApiError::OwnershipViolation => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// ErrorBody
///
/// JSON shape of every error response: `{"status": "Error", "error": "..."}`. Handlers
/// take their inputs through the `extract` wrappers so extractor rejections get it too.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "request failed");
        }

        let body = ErrorBody {
            status: "Error",
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        // Expired, forged and garbled tokens all produce the same response.
        tracing::debug!(cause = %err, "bearer token rejected");
        ApiError::InvalidToken
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ApiError::NotFound(what),
            RepositoryError::AlreadyExists(what) => ApiError::AlreadyExists(what),
            RepositoryError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ApiError::NotFound("file"),
            StorageError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound => ApiError::NotFound("document"),
            DocumentError::Database(e) => ApiError::Internal(e.to_string()),
            DocumentError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errs: validator::ValidationErrors) -> Self {
        ApiError::Validation(errs.to_string())
    }
}

// Extractor rejections keep axum's message but take the JSON body.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
