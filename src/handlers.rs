use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{self, AuthUser, Role},
    errors::ApiError,
    extract::{ApiJson, ApiMultipart, ApiPath, ApiQuery},
    models::{
        CreateStudentRequest, CreateTeacherRequest, Document, DocumentCreate, DocumentFilter,
        DocumentUpdate, FileUpload, LoginRequest, LoginResponse, Student, StoredFile, Teacher,
        UpdateTeacherRequest,
    },
    documents::DocumentStorageState,
    repository::{NewStudent, NewTeacher, RepositoryState},
    storage::{FileStorageState, sanitize_filename},
};

/// health
///
/// [Public Route] Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// get_me
///
/// [Authenticated Route] Echoes the identity the middleware chain resolved from the token.
pub async fn get_me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}

// --- Students ---

/// register_student
///
/// [Public Route] Creates a student account. The password is hashed before it reaches
/// the repository.
pub async fn register_student(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateStudentRequest>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    payload.validate()?;
    tracing::info!(email = %payload.email, "creating a student");

    let password_hash = auth::hash_password(payload.password, state.config.bcrypt_cost).await?;
    let student = state
        .repo
        .create_student(NewStudent {
            name: payload.name,
            email: payload.email,
            age: payload.age,
            password_hash,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(student)))
}

/// login_student
///
/// [Public Route] Exchanges credentials for a token carrying `role = student`. Unknown
/// emails and wrong passwords produce the same 401.
pub async fn login_student(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate()?;

    let student = state
        .repo
        .get_student_by_email(&payload.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !auth::verify_password(payload.password, student.password_hash.clone()).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.issuer.issue(student.id, &student.email, Role::Student)?;
    tracing::info!(student_id = student.id, "student logged in");
    Ok(Json(LoginResponse { token }))
}

/// get_student
///
/// [Protected Route] Students may only read themselves; teachers may read anyone. Both
/// rules are enforced by the middleware chain before this runs.
pub async fn get_student(
    State(repo): State<RepositoryState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Student>, ApiError> {
    repo.get_student(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("student"))
}

// --- Teachers ---

/// register_teacher
///
/// [Public Route] Creates a teacher account.
pub async fn register_teacher(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTeacherRequest>,
) -> Result<(StatusCode, Json<Teacher>), ApiError> {
    payload.validate()?;
    tracing::info!(email = %payload.email, "creating a teacher");

    let password_hash = auth::hash_password(payload.password, state.config.bcrypt_cost).await?;
    let teacher = state
        .repo
        .create_teacher(NewTeacher {
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            password_hash,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(teacher)))
}

/// login_teacher
///
/// [Public Route] Exchanges credentials for a token carrying `role = teacher`.
pub async fn login_teacher(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate()?;

    let teacher = state
        .repo
        .get_teacher_by_email(&payload.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !auth::verify_password(payload.password, teacher.password_hash.clone()).await? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.issuer.issue(teacher.id, &teacher.email, Role::Teacher)?;
    tracing::info!(teacher_id = teacher.id, "teacher logged in");
    Ok(Json(LoginResponse { token }))
}

pub async fn get_teacher(
    State(repo): State<RepositoryState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Teacher>, ApiError> {
    repo.get_teacher(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("teacher"))
}

/// update_teacher
///
/// [Protected Route] Partial update of name, email and subject.
pub async fn update_teacher(
    State(repo): State<RepositoryState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateTeacherRequest>,
) -> Result<Json<Teacher>, ApiError> {
    payload.validate()?;

    repo.update_teacher(id, payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("teacher"))
}

pub async fn delete_teacher(
    State(repo): State<RepositoryState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    if repo.delete_teacher(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("teacher"))
    }
}

/// get_teacher_students
///
/// [Protected Route] Lists the students assigned to a teacher.
pub async fn get_teacher_students(
    State(repo): State<RepositoryState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Student>>, ApiError> {
    if repo.get_teacher(id).await?.is_none() {
        return Err(ApiError::NotFound("teacher"));
    }
    Ok(Json(repo.get_teacher_students(id).await?))
}

/// assign_student
///
/// [Protected Route] Links a student to a teacher. Repeating the call is harmless.
pub async fn assign_student(
    State(repo): State<RepositoryState>,
    ApiPath((teacher_id, student_id)): ApiPath<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    repo.assign_student(teacher_id, student_id).await?;
    tracing::info!(teacher_id, student_id, "student assigned");
    Ok(StatusCode::NO_CONTENT)
}

// --- Files ---

/// upload_file
///
/// [Protected Route] Accepts `multipart/form-data` and stores the part named `file`.
pub async fn upload_file(
    user: AuthUser,
    State(files): State<FileStorageState>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> Result<(StatusCode, Json<StoredFile>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = sanitize_filename(field.file_name().unwrap_or("upload"));
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("invalid file: {e}")))?;

        if data.is_empty() {
            return Err(ApiError::Validation("file is empty".to_string()));
        }

        let stored = files
            .upload(FileUpload {
                name,
                content_type,
                data: data.to_vec(),
            })
            .await?;

        tracing::info!(user_id = %user.id, file_id = %stored.id, size = stored.size, "file uploaded");
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    Err(ApiError::Validation("invalid file".to_string()))
}

pub async fn list_files(
    State(files): State<FileStorageState>,
) -> Result<Json<Vec<StoredFile>>, ApiError> {
    Ok(Json(files.list().await?))
}

/// download_file
///
/// [Protected Route] Streams the stored bytes back with the original content type and an
/// attachment disposition.
pub async fn download_file(
    State(files): State<FileStorageState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ApiError> {
    let (file, data) = files.download(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.name);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

pub async fn delete_file(
    State(files): State<FileStorageState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    files.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Documents ---

pub async fn create_document(
    State(documents): State<DocumentStorageState>,
    ApiJson(payload): ApiJson<DocumentCreate>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    payload.validate()?;
    let document = documents.create(payload).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_document(
    State(documents): State<DocumentStorageState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(documents.get(id).await?))
}

pub async fn update_document(
    State(documents): State<DocumentStorageState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<DocumentUpdate>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(documents.update(id, payload).await?))
}

pub async fn delete_document(
    State(documents): State<DocumentStorageState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    documents.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// list_documents
///
/// [Protected Route] `GET /documents?type=<type>`; the type is required.
pub async fn list_documents(
    State(documents): State<DocumentStorageState>,
    ApiQuery(filter): ApiQuery<DocumentFilter>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let doc_type = filter
        .doc_type
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("document type is required".to_string()))?;

    Ok(Json(documents.list(&doc_type).await?))
}
