#![allow(dead_code)]

use std::env;
use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use candidate_intake::{
    config::Config,
    dto::candidate_dto::{CandidateForm, NamedFile},
    models::candidate::DocumentKey,
    routes::build_router,
    store::memory::{MemoryBlobStore, MemoryDocumentStore},
    utils::crypto::hash_password,
    AppState,
};
use serde_json::Value as JsonValue;
use tower::ServiceExt;

pub const ADMIN_PASSWORD: &str = "review-console";
pub const BOUNDARY: &str = "X-INTAKE-BOUNDARY";
pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> Config {
    CONFIG
        .get_or_init(|| {
            dotenvy::dotenv().ok();
            env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
            env::set_var("STORE_BACKEND", "memory");
            env::set_var("BLOB_BACKEND", "memory");
            env::set_var("JWT_SECRET", "test_secret_key");
            env::set_var(
                "ADMIN_PASSWORD_HASH",
                hash_password(ADMIN_PASSWORD).expect("hash password"),
            );
            env::set_var("PUBLIC_RPS", "1000");
            env::set_var("ALLOWED_MIME_TYPES", "image/jpeg,image/png");
            env::remove_var("MAX_UPLOAD_BYTES");
            let config = Config::from_env().expect("config");
            config.validate().expect("valid config");
            config
        })
        .clone()
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let state = AppState::new(&config(), store.clone(), blobs.clone());
        Self { state, store, blobs }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, JsonValue) {
        let res = self.router().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
        };
        (status, body)
    }

    pub async fn admin_token(&self) -> String {
        let req = Request::builder()
            .method("POST")
            .uri("/api/admin/login")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "password": ADMIN_PASSWORD }).to_string(),
            ))
            .expect("request");
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }
}

pub fn document(key: DocumentKey) -> NamedFile {
    NamedFile {
        key,
        file_name: format!("{key}.jpg"),
        content_type: "image/jpeg".into(),
        bytes: Bytes::from_static(JPEG),
    }
}

pub fn maria_form() -> CandidateForm {
    CandidateForm {
        name: "Maria Silva".into(),
        age: "29".into(),
        phone: "(11) 98888-7777".into(),
        national_id: "111.444.777-35".into(),
        documents: DocumentKey::ALL.into_iter().map(document).collect(),
    }
}

/// Encodes text fields and `(field, filename, content type, bytes)` files as multipart/form-data.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, content_type, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn submission_request(national_id: &str) -> Request<Body> {
    let fields = [
        ("name", "Maria Silva"),
        ("age", "29"),
        ("phone", "(11) 98888-7777"),
        ("nationalId", national_id),
    ];
    let files: Vec<(&str, &str, &str, &[u8])> = DocumentKey::ALL
        .iter()
        .map(|key| (key.as_str(), "scan.jpg", "image/jpeg", JPEG))
        .collect();
    Request::builder()
        .method("POST")
        .uri("/api/public/candidates")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("user-agent", "intake-tests")
        .body(Body::from(multipart_body(&fields, &files)))
        .expect("request")
}
