#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::FixedOffset;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use careflow_api::config::{LogFormat, ServerConfig};
use careflow_api::router::build_app_router;
use careflow_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// a 30-second request timeout and UTC for scheduled triggers.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        schedule_offset: FixedOffset::east_opt(0).unwrap(),
        log_format: LogFormat::Pretty,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

/// POST without a body (lifecycle endpoints).
pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None).await
}

pub async fn put_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// The `data` member of a successful envelope.
pub async fn data(response: Response<Body>) -> Value {
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn text_step(trigger_type: &str, trigger_value: &str, text: &str) -> Value {
    json!({
        "trigger_type": trigger_type,
        "trigger_value": trigger_value,
        "message_type": "text",
        "content_payload": { "text": text },
    })
}

pub fn action_step(trigger_type: &str, trigger_value: &str, text: &str) -> Value {
    json!({
        "trigger_type": trigger_type,
        "trigger_value": trigger_value,
        "message_type": "text",
        "content_payload": { "text": text },
        "requires_action": true,
        "feedback_config": {
            "question": "Did you take it?",
            "buttons": [
                { "label": "Yes", "value": "yes", "action": "complete" },
                { "label": "Later", "value": "later", "action": "postpone" },
                { "label": "Skip", "value": "skip", "action": "skip" }
            ]
        }
    })
}

pub async fn create_patient(pool: &PgPool, name: &str) -> i64 {
    let response = post_json(
        build_test_app(pool.clone()),
        "/api/v1/patients",
        json!({ "display_name": name }),
    )
    .await;
    data(response).await["id"].as_i64().unwrap()
}

/// Create a draft through the API and give it `steps`.
pub async fn create_draft(pool: &PgPool, name: &str, steps: Vec<Value>) -> i64 {
    let response = post_json(
        build_test_app(pool.clone()),
        "/api/v1/protocols",
        json!({ "name": name }),
    )
    .await;
    let id = data(response).await["id"].as_i64().unwrap();

    put_json(
        build_test_app(pool.clone()),
        &format!("/api/v1/protocols/{id}/steps"),
        json!({ "steps": steps }),
    )
    .await;
    id
}

/// "Daily Meds": immediate reminder, then a 60 minute delayed check-in.
pub async fn daily_meds(pool: &PgPool) -> i64 {
    let id = create_draft(
        pool,
        "Daily Meds",
        vec![
            text_step("immediate", "", "Time for your morning pills"),
            action_step("delay", "60", "Did you take your pills?"),
        ],
    )
    .await;
    post_empty(
        build_test_app(pool.clone()),
        &format!("/api/v1/protocols/{id}/activate"),
    )
    .await;
    id
}

pub async fn assign(pool: &PgPool, protocol_id: i64, patient_id: i64) -> i64 {
    let response = post_json(
        build_test_app(pool.clone()),
        "/api/v1/assignments",
        json!({ "protocol_id": protocol_id, "patient_id": patient_id }),
    )
    .await;
    data(response).await["id"].as_i64().unwrap()
}
