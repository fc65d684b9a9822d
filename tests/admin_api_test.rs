mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use candidate_intake::store::{AUTH_LOGS, CANDIDATES};
use common::{submission_request, TestApp};
use serde_json::json;

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

#[tokio::test]
async fn health_reports_backends() {
    let app = TestApp::new();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn admin_routes_require_a_session() {
    let app = TestApp::new();

    let req = Request::builder()
        .uri("/api/admin/candidates")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "auth/unauthorized");

    let (status, _) = app.send(get("/api/admin/candidates", "forged.token.value")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected_and_logged() {
    let app = TestApp::new();
    let (status, body) = app
        .send(post_json(
            "/api/admin/login",
            None,
            json!({ "password": "nope" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Incorrect password.");
    assert_eq!(app.store.count(AUTH_LOGS), 1);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, _) = app.send(get("/api/admin/notifications", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(post_json("/api/admin/logout", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(get("/api/admin/notifications", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.count(AUTH_LOGS), 2);
}

#[tokio::test]
async fn public_submission_then_admin_review() {
    let app = TestApp::new();

    let (status, body) = app.send(submission_request("111.444.777-35")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "Backlog");
    let id = body["id"].as_str().expect("id").to_string();

    let token = app.admin_token().await;
    let mut feed = app.state.feed.watch();
    feed.wait_for(|s| s.candidates.len() == 1).await.unwrap();

    let (status, body) = app.send(get("/api/admin/candidates", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], false);
    assert_eq!(body["candidates"][0]["id"], id.as_str());
    assert_eq!(body["candidates"][0]["nationalId"], "111.444.777-35");

    let (status, body) = app
        .send(get(&format!("/api/admin/candidates/{id}"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    let version = body["version"].as_i64().expect("version");

    let (status, body) = app
        .send(post_json(
            &format!("/api/admin/candidates/{id}/status"),
            Some(&token),
            json!({ "status": "approved", "expectedVersion": version }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "Approved");

    let (status, body) = app
        .send(post_json(
            &format!("/api/admin/candidates/{id}/status"),
            Some(&token),
            json!({ "status": "Rejected", "expectedVersion": version }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "db/conflict");

    let (status, body) = app
        .send(get(&format!("/api/admin/candidates/{id}/history"), &token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[0]["action"], "status_update");
    assert_eq!(body[0]["oldStatus"], "Backlog");
    assert_eq!(body[0]["newStatus"], "Approved");

    let (status, body) = app.send(get("/api/admin/notifications", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let messages: Vec<String> = body
        .as_array()
        .expect("notifications")
        .iter()
        .filter_map(|n| n["message"].as_str().map(str::to_string))
        .collect();
    assert!(messages.contains(&"Maria Silva moved to Approved".to_string()));
    assert!(messages
        .contains(&"This candidate was changed by someone else. Reload and try again.".to_string()));

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/admin/candidates/{id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.store.count(CANDIDATES), 0);

    let (status, body) = app
        .send(get(&format!("/api/admin/candidates/{id}"), &token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "request/not-found");
}

#[tokio::test]
async fn invalid_submission_returns_field_errors() {
    let app = TestApp::new();
    let (status, body) = app.send(submission_request("111.444.777-36")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(
        body["fields"]["nationalId"],
        "National ID check digits do not match"
    );
    assert_eq!(app.store.count(CANDIDATES), 0);
}

#[tokio::test]
async fn field_validation_endpoint() {
    let app = TestApp::new();
    let (status, body) = app
        .send(post_json(
            "/api/public/validate",
            None,
            json!({ "field": "age", "value": "15" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Age must be between 16 and 100");

    let (status, body) = app
        .send(post_json(
            "/api/public/validate",
            None,
            json!({ "field": "phone", "value": "(11) 98888-7777" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["error"].is_null());

    let (status, _) = app
        .send(post_json(
            "/api/public/validate",
            None,
            json!({ "field": "email", "value": "x" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_sync_writes_a_heartbeat() {
    let app = TestApp::new();
    let token = app.admin_token().await;

    let (status, body) = app.send(get("/api/admin/sync", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isOnline"], false);
    assert!(body["lastHeartbeat"].is_null());

    app.state.sync_monitor.set_online(true).await;
    let (status, body) = app
        .send(post_json("/api/admin/sync", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isOnline"], true);
    assert_eq!(body["status"], "success");
    assert!(body["lastHeartbeat"]["lastSync"].is_string());
}
