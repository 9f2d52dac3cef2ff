use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// --- Core Schemas (Mapped to Database) ---

/// Student
///
/// A row of the `students` table. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub age: i32,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Teacher
///
/// A row of the `teachers` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct Teacher {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, message = "field name is required"))]
    pub name: String,
    #[validate(email(message = "field email is invalid"))]
    pub email: String,
    #[validate(range(min = 1, message = "field age is invalid"))]
    pub age: i32,
    #[validate(length(min = 6, message = "field password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTeacherRequest {
    #[validate(length(min = 1, message = "field name is required"))]
    pub name: String,
    #[validate(email(message = "field email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "field subject is required"))]
    pub subject: String,
    #[validate(length(min = 6, message = "field password must be at least 6 characters"))]
    pub password: String,
}

/// UpdateTeacherRequest
///
/// Partial update: only fields that are present are written.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct UpdateTeacherRequest {
    #[validate(length(min = 1, message = "field name is invalid"))]
    pub name: Option<String>,
    #[validate(email(message = "field email is invalid"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "field subject is invalid"))]
    pub subject: Option<String>,
}

/// LoginRequest
///
/// Credentials for both `/students/login` and `/teachers/login`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "field email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, message = "field password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

// --- File Storage ---

/// FileUpload
///
/// A file received from a multipart request, ready to hand to the storage backend.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// StoredFile
///
/// Metadata of a file held by the object store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub id: Uuid,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    pub url: String,
    pub bucket_name: String,
    pub uploaded_at: DateTime<Utc>,
}

// --- Document Storage ---

/// Document
///
/// A schemaless JSON document grouped by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Document {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DocumentCreate {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "field type is required"))]
    pub doc_type: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub data: Map<String, Value>,
}

/// DocumentFilter
///
/// Query string of `GET /documents`. The type is mandatory; its absence is reported as
/// a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentFilter {
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
}
