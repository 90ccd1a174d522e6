//! HTTP surface: status codes, error bodies and the admin guard

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{env, seed_user, wallet, TestEnv, ADMIN_SECRET};
use serde_json::{json, Value};
use tower::ServiceExt;
use void_collector::api::ApiServer;

fn app(env: &TestEnv) -> Router {
    ApiServer::new(env.services.clone()).router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(mut request: Request<Body>) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", ADMIN_SECRET).parse().unwrap(),
    );
    request
}

#[tokio::test]
async fn test_health_and_unknown_user() {
    let env = env();
    let app = app(&env);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");

    let (status, body) = send(&app, get("/api/game-state?subject=ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_convert_then_cooldown_denial() {
    let env = env();
    seed_user(&env, "player", &wallet(1), 1_000_000);
    let app = app(&env);
    let convert = || json_request(Method::POST, "/api/convert", json!({"subject_id": "player", "token_amount": 0.01}));

    let (status, body) = send(&app, convert()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["particles_spent"], 75_000);

    let (status, body) = send(&app, convert()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["reason"], "personal_cooldown");
    assert!(body["retry_hint"].is_string());
}

#[tokio::test]
async fn test_duplicate_spin_reference() {
    let env = env();
    seed_user(&env, "player", &wallet(1), 0);
    let app = app(&env);
    let spin = || {
        json_request(
            Method::POST,
            "/api/minigames/spin",
            json!({"subject_id": "player", "transaction_ref": "tx-1", "variant": "free"}),
        )
    };

    let (status, body) = send(&app, spin()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variant"], "free");

    let (status, body) = send(&app, spin()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "duplicate_transaction");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/minigames/spin",
            json!({"subject_id": "player", "transaction_ref": "tx-2", "variant": "free"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["reason"], "spin_cooldown");
    assert!(body["retry_hint"].is_string());
}

#[tokio::test]
async fn test_malformed_requests_use_error_body() {
    let env = env();
    seed_user(&env, "player", &wallet(1), 1_000_000);
    let app = app(&env);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/convert", json!({"subject_id": "player"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["message"].as_str().unwrap().contains("token_amount"));
    assert!(body["request_id"].is_string());

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/minigames/spin",
            json!({"subject_id": "player", "transaction_ref": "tx-1", "variant": "huge"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, body) = send(&app, get("/api/game-state")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let untyped = Request::builder()
        .method(Method::POST)
        .uri("/api/convert")
        .body(Body::from(r#"{"subject_id":"player","token_amount":0.01}"#))
        .unwrap();
    let (status, body) = send(&app, untyped).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    assert_eq!(env.services.ledger().get_user("player").unwrap().balance, 1_000_000);
}

#[tokio::test]
async fn test_sync_regression_reported_as_unsaved() {
    let env = env();
    seed_user(&env, "veteran", &wallet(1), 5_000_000);
    let app = app(&env);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/game-state",
            json!({"subject_id": "veteran", "total_particles_collected": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], false);
    assert_eq!(body["reason"], "regression_detected");

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/game-state", json!({"particles": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_bearer_secret() {
    let env = env();
    let app = app(&env);

    let (status, body) = send(&app, get("/api/admin/withdrawals")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let mut wrong = get("/api/admin/withdrawals");
    wrong
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer not-the-secret".parse().unwrap());
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, admin(get("/api/admin/withdrawals?status=all"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["withdrawals"], json!([]));

    let (status, _) = send(&app, admin(get("/api/admin/withdrawals?status=bogus"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_terminal_withdrawal_cannot_transition() {
    let env = env();
    seed_user(&env, "player", &wallet(1), 1_000_000);
    let receipt = env
        .services
        .conversion
        .convert("player", 0.01, chrono::Utc::now())
        .unwrap();
    let app = app(&env);

    let (status, body) = send(
        &app,
        admin(json_request(
            Method::PATCH,
            "/api/admin/withdrawals",
            json!({"id": receipt.withdrawal_id, "status": "rejected", "admin_note": "manual review"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["admin_note"], "manual review");

    let (status, body) = send(
        &app,
        admin(json_request(
            Method::PATCH,
            "/api/admin/withdrawals",
            json!({"id": receipt.withdrawal_id, "status": "paid"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    let (status, _) = send(
        &app,
        admin(json_request(
            Method::PATCH,
            "/api/admin/withdrawals",
            json!({"id": receipt.withdrawal_id, "status": "shipped"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
