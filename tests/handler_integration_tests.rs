mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use classroom_api::storage::InMemoryFileStorage;
use common::{TestApp, json_request, request, spawn_app, spawn_app_with_files};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "classroom-test-boundary";

fn multipart_request(token: &str, field: &str, filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/api/v1/files")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register_and_login(app: &TestApp, kind: &str, payload: Value) -> (i64, String) {
    let (status, created) = app
        .send(json_request("POST", &format!("/api/v1/{kind}"), None, &payload))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");

    let credentials = json!({"email": payload["email"], "password": payload["password"]});
    let (status, login) = app
        .send(json_request(
            "POST",
            &format!("/api/v1/{kind}/login"),
            None,
            &credentials,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{login}");

    (
        created["id"].as_i64().unwrap(),
        login["token"].as_str().unwrap().to_string(),
    )
}

fn student_payload(email: &str) -> Value {
    json!({"name": "Grace", "email": email, "age": 19, "password": "hopper123"})
}

fn teacher_payload(email: &str) -> Value {
    json!({"name": "Ada", "email": email, "subject": "Computing", "password": "lovelace1"})
}

// --- Health ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/v1/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

// --- Students ---

#[tokio::test]
async fn test_student_registration_and_login_flow() {
    let app = spawn_app();

    let (id, token) = register_and_login(&app, "students", student_payload("grace@school.test")).await;

    let (status, me) = app.send(request("GET", "/api/v1/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);
    assert_eq!(me["role"], "student");

    let (status, student) = app
        .send(request("GET", &format!("/api/v1/students/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(student["name"], "Grace");
    assert!(student.get("password_hash").is_none());
}

#[tokio::test]
async fn test_duplicate_student_email_is_409() {
    let app = spawn_app();
    let payload = student_payload("dup@school.test");

    let (first, _) = app.send(json_request("POST", "/api/v1/students", None, &payload)).await;
    let (second, body) = app.send(json_request("POST", "/api/v1/students", None, &payload)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["error"], "student already exists");
}

#[tokio::test]
async fn test_invalid_student_payload_is_400() {
    let app = spawn_app();
    let payload = json!({"name": "", "email": "not-an-email", "age": 0, "password": "123"});

    let (status, body) = app.send(json_request("POST", "/api/v1/students", None, &payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
    assert_eq!(app.repo.calls(), 0);
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_401() {
    let app = spawn_app();
    register_and_login(&app, "students", student_payload("grace@school.test")).await;

    let wrong_password = json!({"email": "grace@school.test", "password": "wrong-password"});
    let unknown_email = json!({"email": "nobody@school.test", "password": "hopper123"});

    for credentials in [wrong_password, unknown_email] {
        let (status, body) = app
            .send(json_request("POST", "/api/v1/students/login", None, &credentials))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid credentials");
    }
}

#[tokio::test]
async fn test_student_login_does_not_open_teacher_login() {
    let app = spawn_app();
    register_and_login(&app, "students", student_payload("grace@school.test")).await;

    let credentials = json!({"email": "grace@school.test", "password": "hopper123"});
    let (status, _) = app
        .send(json_request("POST", "/api/v1/teachers/login", None, &credentials))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_student_is_404_for_teachers() {
    let app = spawn_app();
    let token = app.token("1", Some("teacher"));

    let (status, body) = app.send(request("GET", "/api/v1/students/999", Some(&token))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "student not found");
}

// --- Teachers ---

#[tokio::test]
async fn test_teacher_management_flow() {
    let app = spawn_app();
    let (teacher_id, token) =
        register_and_login(&app, "teachers", teacher_payload("ada@school.test")).await;
    let (student_id, _) =
        register_and_login(&app, "students", student_payload("grace@school.test")).await;

    let (status, teacher) = app
        .send(request("GET", &format!("/api/v1/teachers/{teacher_id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(teacher["subject"], "Computing");

    let (status, updated) = app
        .send(json_request(
            "PUT",
            &format!("/api/v1/teachers/{teacher_id}"),
            Some(&token),
            &json!({"subject": "Mathematics"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["subject"], "Mathematics");
    assert_eq!(updated["name"], "Ada");

    // Assigning twice leaves a single entry.
    let assign = format!("/api/v1/teachers/{teacher_id}/students/{student_id}");
    for _ in 0..2 {
        let (status, _) = app.send(request("POST", &assign, Some(&token))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, roster) = app
        .send(request(
            "GET",
            &format!("/api/v1/teachers/{teacher_id}/students"),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster.as_array().unwrap().len(), 1);
    assert_eq!(roster[0]["id"], student_id);

    let (status, _) = app
        .send(request("DELETE", &format!("/api/v1/teachers/{teacher_id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(request("GET", &format!("/api/v1/teachers/{teacher_id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assigning_unknown_student_is_404() {
    let app = spawn_app();
    app.repo.seed_teacher(3, "t3@school.test");
    let token = app.token("3", Some("teacher"));

    let (status, body) = app
        .send(request("POST", "/api/v1/teachers/3/students/404", Some(&token)))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "teacher or student not found");
}

#[tokio::test]
async fn test_roster_of_unknown_teacher_is_404() {
    let app = spawn_app();
    let token = app.token("3", Some("teacher"));

    let (status, _) = app
        .send(request("GET", "/api/v1/teachers/77/students", Some(&token)))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// --- Files ---

#[tokio::test]
async fn test_file_upload_download_delete_flow() {
    let app = spawn_app();
    let token = app.token("42", Some("student"));

    let (status, stored) = app
        .send(multipart_request(&token, "file", "../../notes.txt", "hello world"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{stored}");
    assert_eq!(stored["name"], "notes.txt");
    assert_eq!(stored["size"], 11);
    assert_eq!(stored["content_type"], "text/plain");
    let id = stored["id"].as_str().unwrap().to_string();

    let (status, listing) = app.send(request("GET", "/api/v1/files", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing[0]["id"], id.as_str());

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &format!("/api/v1/files/{id}"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let (status, _) = app
        .send(request("DELETE", &format!("/api/v1/files/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(request("GET", &format!("/api/v1/files/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "file not found");
}

#[tokio::test]
async fn test_upload_without_file_field_is_400() {
    let app = spawn_app();
    let token = app.token("42", Some("student"));

    let (status, body) = app
        .send(multipart_request(&token, "attachment", "notes.txt", "hello"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid file");
}

#[tokio::test]
async fn test_storage_failure_is_500_without_details() {
    let app = spawn_app_with_files(Arc::new(InMemoryFileStorage::new_failing()));
    let token = app.token("1", Some("teacher"));

    let (status, body) = app
        .send(multipart_request(&token, "file", "report.txt", "data"))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

// --- Documents ---

#[tokio::test]
async fn test_document_crud_flow() {
    let app = spawn_app();
    let token = app.token("42", Some("student"));

    let (status, created) = app
        .send(json_request(
            "POST",
            "/api/v1/documents",
            Some(&token),
            &json!({"type": "homework", "data": {"title": "Fractions", "due": "friday"}}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["type"], "homework");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, listing) = app
        .send(request("GET", "/api/v1/documents?type=homework", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().unwrap().len(), 1);

    let (status, other) = app
        .send(request("GET", "/api/v1/documents?type=grades", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other, json!([]));

    let (status, updated) = app
        .send(json_request(
            "PUT",
            &format!("/api/v1/documents/{id}"),
            Some(&token),
            &json!({"data": {"title": "Decimals"}}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"], json!({"title": "Decimals"}));

    let (status, fetched) = app
        .send(request("GET", &format!("/api/v1/documents/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["title"], "Decimals");

    let (status, _) = app
        .send(request("DELETE", &format!("/api/v1/documents/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(request("GET", &format!("/api/v1/documents/{id}"), Some(&token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "document not found");
}

#[tokio::test]
async fn test_listing_documents_requires_type() {
    let app = spawn_app();
    let token = app.token("42", Some("student"));

    for uri in ["/api/v1/documents", "/api/v1/documents?type="] {
        let (status, body) = app.send(request("GET", uri, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "document type is required");
    }
}

// --- Malformed requests ---

fn raw_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    body: &str,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_malformed_json_body_is_400_with_error_body() {
    let app = spawn_app();

    for content_type in ["application/json", "text/plain"] {
        let (status, body) = app
            .send(raw_request("POST", "/api/v1/students", None, content_type, "{not json"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type}");
        assert_eq!(body["status"], "Error");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    assert_eq!(app.repo.calls(), 0);
}

#[tokio::test]
async fn test_unparseable_path_ids_are_400_with_error_body() {
    let app = spawn_app();
    let token = app.token("1", Some("teacher"));

    for (method, uri) in [
        ("GET", "/api/v1/students/abc"),
        ("GET", "/api/v1/teachers/abc"),
        ("POST", "/api/v1/teachers/1/students/abc"),
        ("GET", "/api/v1/documents/not-a-uuid"),
        ("GET", "/api/v1/files/not-a-uuid"),
    ] {
        let (status, body) = app.send(request(method, uri, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["status"], "Error", "{uri}");
    }

    assert_eq!(app.repo.calls(), 0);
}

#[tokio::test]
async fn test_upload_without_multipart_boundary_is_400_with_error_body() {
    let app = spawn_app();
    let token = app.token("42", Some("student"));

    let (status, body) = app
        .send(raw_request("POST", "/api/v1/files", Some(&token), "multipart/form-data", "hello"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
}
