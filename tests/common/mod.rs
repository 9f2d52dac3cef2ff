#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use classroom_api::{
    AppConfig, AppState, create_router,
    documents::InMemoryDocumentStorage,
    models::{Student, Teacher, UpdateTeacherRequest},
    repository::{NewStudent, NewTeacher, Repository, RepositoryError},
    storage::{FileStorageState, InMemoryFileStorage},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tower::ServiceExt;

// --- Mock Repository ---

#[derive(Default)]
struct Tables {
    students: HashMap<i64, Student>,
    teachers: HashMap<i64, Teacher>,
    assignments: BTreeSet<(i64, i64)>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory `Repository` that counts every call, so tests can prove a handler never ran.
#[derive(Default)]
pub struct MockRepository {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
}

impl MockRepository {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Inserts a student with a fixed id, bypassing the call counter.
    pub fn seed_student(&self, id: i64, email: &str) -> Student {
        let now = Utc::now();
        let student = Student {
            id,
            name: format!("Student {id}"),
            email: email.to_string(),
            age: 20,
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.next_id = tables.next_id.max(id);
        tables.students.insert(id, student.clone());
        student
    }

    pub fn seed_teacher(&self, id: i64, email: &str) -> Teacher {
        let now = Utc::now();
        let teacher = Teacher {
            id,
            name: format!("Teacher {id}"),
            email: email.to_string(),
            subject: "Mathematics".to_string(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.next_id = tables.next_id.max(id);
        tables.teachers.insert(id, teacher.clone());
        teacher
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn create_student(&self, student: NewStudent) -> Result<Student, RepositoryError> {
        self.touch();
        let mut tables = self.tables.lock().unwrap();
        if tables.students.values().any(|s| s.email == student.email) {
            return Err(RepositoryError::AlreadyExists("student"));
        }
        let now = Utc::now();
        let id = tables.next_id();
        let created = Student {
            id,
            name: student.name,
            email: student.email,
            age: student.age,
            password_hash: student.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.students.insert(id, created.clone());
        Ok(created)
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, RepositoryError> {
        self.touch();
        Ok(self.tables.lock().unwrap().students.get(&id).cloned())
    }

    async fn get_student_by_email(&self, email: &str) -> Result<Option<Student>, RepositoryError> {
        self.touch();
        Ok(self
            .tables
            .lock()
            .unwrap()
            .students
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn create_teacher(&self, teacher: NewTeacher) -> Result<Teacher, RepositoryError> {
        self.touch();
        let mut tables = self.tables.lock().unwrap();
        if tables.teachers.values().any(|t| t.email == teacher.email) {
            return Err(RepositoryError::AlreadyExists("teacher"));
        }
        let now = Utc::now();
        let id = tables.next_id();
        let created = Teacher {
            id,
            name: teacher.name,
            email: teacher.email,
            subject: teacher.subject,
            password_hash: teacher.password_hash,
            created_at: now,
            updated_at: now,
        };
        tables.teachers.insert(id, created.clone());
        Ok(created)
    }

    async fn get_teacher(&self, id: i64) -> Result<Option<Teacher>, RepositoryError> {
        self.touch();
        Ok(self.tables.lock().unwrap().teachers.get(&id).cloned())
    }

    async fn get_teacher_by_email(&self, email: &str) -> Result<Option<Teacher>, RepositoryError> {
        self.touch();
        Ok(self
            .tables
            .lock()
            .unwrap()
            .teachers
            .values()
            .find(|t| t.email == email)
            .cloned())
    }

    async fn update_teacher(
        &self,
        id: i64,
        req: UpdateTeacherRequest,
    ) -> Result<Option<Teacher>, RepositoryError> {
        self.touch();
        let mut tables = self.tables.lock().unwrap();
        let Some(teacher) = tables.teachers.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            teacher.name = name;
        }
        if let Some(email) = req.email {
            teacher.email = email;
        }
        if let Some(subject) = req.subject {
            teacher.subject = subject;
        }
        teacher.updated_at = Utc::now();
        Ok(Some(teacher.clone()))
    }

    async fn delete_teacher(&self, id: i64) -> Result<bool, RepositoryError> {
        self.touch();
        let mut tables = self.tables.lock().unwrap();
        tables.assignments.retain(|(teacher_id, _)| *teacher_id != id);
        Ok(tables.teachers.remove(&id).is_some())
    }

    async fn assign_student(&self, teacher_id: i64, student_id: i64) -> Result<(), RepositoryError> {
        self.touch();
        let mut tables = self.tables.lock().unwrap();
        if !tables.teachers.contains_key(&teacher_id) || !tables.students.contains_key(&student_id) {
            return Err(RepositoryError::NotFound("teacher or student"));
        }
        tables.assignments.insert((teacher_id, student_id));
        Ok(())
    }

    async fn get_teacher_students(&self, teacher_id: i64) -> Result<Vec<Student>, RepositoryError> {
        self.touch();
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .assignments
            .iter()
            .filter(|(t, _)| *t == teacher_id)
            .filter_map(|(_, s)| tables.students.get(s).cloned())
            .collect())
    }
}

// --- App Assembly ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MockRepository>,
    pub config: AppConfig,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_files(Arc::new(InMemoryFileStorage::new()))
}

pub fn spawn_app_with_files(files: FileStorageState) -> TestApp {
    let repo = Arc::new(MockRepository::default());
    let config = AppConfig::default();
    let state = AppState::new(
        repo.clone(),
        files,
        Arc::new(InMemoryDocumentStorage::new()),
        config.clone(),
    );
    TestApp {
        router: create_router(state),
        repo,
        config,
    }
}

impl TestApp {
    /// Sends one request through the full router and decodes the body as JSON when it is JSON.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub fn token(&self, sub: &str, role: Option<&str>) -> String {
        sign(&claims(sub, role, 3600), &self.config.jwt_secret)
    }
}

// --- Token Helpers ---

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Claims with `exp` at `now + ttl` seconds. A negative `ttl` yields an expired token.
pub fn claims(sub: &str, role: Option<&str>, ttl: i64) -> Value {
    let mut claims = json!({
        "sub": sub,
        "email": format!("user{sub}@school.test"),
        "iat": now(),
        "exp": now() + ttl,
    });
    if let Some(role) = role {
        claims["role"] = json!(role);
    }
    claims
}

pub fn sign(claims: &Value, secret: &str) -> String {
    sign_with(claims, secret, Algorithm::HS256)
}

pub fn sign_with(claims: &Value, secret: &str, alg: Algorithm) -> String {
    encode(
        &Header::new(alg),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

/// A token declaring `alg: none` with an empty signature.
pub fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

// --- Request Helpers ---

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
