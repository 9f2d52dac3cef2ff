use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Student, Teacher, UpdateTeacherRequest};

/// RepositoryError
///
/// Failures of the persistence layer. Constraint violations are surfaced as domain
/// errors; anything else is an opaque database failure.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// NewStudent / NewTeacher
///
/// Insert payloads. The password is already hashed by the time it reaches the repository.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewTeacher {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub password_hash: String,
}

/// Repository Trait
///
/// The persistence contract for students, teachers and their assignments. Handlers only
/// ever see `Arc<dyn Repository>`, which keeps Postgres out of the request path in tests.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Students ---
    async fn create_student(&self, student: NewStudent) -> Result<Student, RepositoryError>;
    async fn get_student(&self, id: i64) -> Result<Option<Student>, RepositoryError>;
    async fn get_student_by_email(&self, email: &str) -> Result<Option<Student>, RepositoryError>;

    // --- Teachers ---
    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, RepositoryError>;
    async fn get_teacher(&self, id: i64) -> Result<Option<Teacher>, RepositoryError>;
    async fn get_teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, RepositoryError>;
    // Partial update; `None` when no teacher has this id.
    async fn update_teacher(
        &self,
        id: i64,
        req: UpdateTeacherRequest,
    ) -> Result<Option<Teacher>, RepositoryError>;
    // Returns false when no teacher has this id.
    async fn delete_teacher(&self, id: i64) -> Result<bool, RepositoryError>;

    // --- Assignments ---
    // Idempotent: assigning an already assigned student succeeds.
    async fn assign_student(&self, teacher_id: i64, student_id: i64) -> Result<(), RepositoryError>;
    async fn get_teacher_students(&self, teacher_id: i64) -> Result<Vec<Student>, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Tables are created by
/// `sql/schema.sql`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies `sql/schema.sql`. Every statement is `IF NOT EXISTS`, so this is safe to
    /// run on each start.
    pub async fn apply_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(include_str!("../sql/schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

const STUDENT_COLUMNS: &str = "id, name, email, age, password_hash, created_at, updated_at";
const TEACHER_COLUMNS: &str = "id, name, email, subject, password_hash, created_at, updated_at";

/// Maps a unique-constraint violation to `AlreadyExists`.
fn conflict_as(what: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::AlreadyExists(what),
        _ => RepositoryError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        let query = format!(
            "INSERT INTO students (name, email, age, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING {STUDENT_COLUMNS}"
        );
        sqlx::query_as::<_, Student>(&query)
            .bind(student.name)
            .bind(student.email)
            .bind(student.age)
            .bind(student.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_as("student"))
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, RepositoryError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1");
        Ok(sqlx::query_as::<_, Student>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_student_by_email(&self, email: &str) -> Result<Option<Student>, RepositoryError> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE email = $1");
        Ok(sqlx::query_as::<_, Student>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, RepositoryError> {
        let query = format!(
            "INSERT INTO teachers (name, email, subject, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING {TEACHER_COLUMNS}"
        );
        sqlx::query_as::<_, Teacher>(&query)
            .bind(teacher.name)
            .bind(teacher.email)
            .bind(teacher.subject)
            .bind(teacher.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_as("teacher"))
    }

    async fn get_teacher(&self, id: i64) -> Result<Option<Teacher>, RepositoryError> {
        let query = format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE id = $1");
        Ok(sqlx::query_as::<_, Teacher>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, RepositoryError> {
        let query = format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE email = $1");
        Ok(sqlx::query_as::<_, Teacher>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// update_teacher
    ///
    /// `COALESCE` keeps the stored value for every field left out of the request.
    async fn update_teacher(
        &self,
        id: i64,
        req: UpdateTeacherRequest,
    ) -> Result<Option<Teacher>, RepositoryError> {
        let query = format!(
            "UPDATE teachers \
             SET name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 subject = COALESCE($4, subject), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {TEACHER_COLUMNS}"
        );
        sqlx::query_as::<_, Teacher>(&query)
            .bind(id)
            .bind(req.name)
            .bind(req.email)
            .bind(req.subject)
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict_as("teacher"))
    }

    async fn delete_teacher(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM teachers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// assign_student
    ///
    /// `ON CONFLICT DO NOTHING` makes repeated assignments a no-op. A missing teacher or
    /// student trips the foreign keys and is reported as `NotFound`.
    async fn assign_student(&self, teacher_id: i64, student_id: i64) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO teacher_students (teacher_id, student_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(teacher_id)
        .bind(student_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                RepositoryError::NotFound("teacher or student")
            }
            _ => RepositoryError::Database(e),
        })?;
        Ok(())
    }

    async fn get_teacher_students(&self, teacher_id: i64) -> Result<Vec<Student>, RepositoryError> {
        let query = "SELECT s.id, s.name, s.email, s.age, s.password_hash, s.created_at, s.updated_at \
                     FROM students s \
                     JOIN teacher_students ts ON ts.student_id = s.id \
                     WHERE ts.teacher_id = $1 \
                     ORDER BY s.id";
        Ok(sqlx::query_as::<_, Student>(query)
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?)
    }
}
