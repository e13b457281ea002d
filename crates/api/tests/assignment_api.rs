//! HTTP-level tests for the assignment lifecycle and step events.

mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use common::{assign, body_json, create_patient, daily_meds, data, delete, get, post_empty, post_json};
use serde_json::{json, Value};
use sqlx::PgPool;

async fn record(pool: &PgPool, id: i64, body: Value) -> (StatusCode, Value) {
    let response = post_json(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/assignments/{id}/events"),
        body,
    )
    .await;
    (response.status(), body_json(response).await)
}

async fn lifecycle(pool: &PgPool, id: i64, action: &str) -> (StatusCode, Value) {
    let response = post_empty(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/assignments/{id}/{action}"),
    )
    .await;
    (response.status(), body_json(response).await)
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn assignment_starts_in_assigned_state(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;

    let response = post_json(
        common::build_test_app(pool.clone()),
        "/api/v1/assignments",
        json!({ "protocol_id": protocol_id, "patient_id": patient_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let assignment = data(response).await;
    assert_eq!(assignment["status"], "assigned");
    assert_eq!(assignment["current_step_index"], 0);
    assert_eq!(assignment["adherence_rate"], Value::Null);

    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/assignments",
        json!({ "protocol_id": protocol_id, "patient_id": patient_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn draft_protocols_cannot_be_assigned(pool: PgPool) {
    let protocol_id =
        common::create_draft(&pool, "Draft", vec![common::text_step("immediate", "", "x")]).await;
    let patient_id = create_patient(&pool, "Mali").await;

    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/assignments",
        json!({ "protocol_id": protocol_id, "patient_id": patient_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "INVALID_STATE");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lifecycle_transitions(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;

    let (status, json) = lifecycle(&pool, id, "pause").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_STATE");

    let (status, json) = lifecycle(&pool, id, "start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(json["data"]["current_step_index"], 1);
    assert_eq!(json["data"]["total_steps"], 2);
    // Step 1 is immediate.
    assert_eq!(json["data"]["next_fire_at"], json["data"]["started_at"]);

    let (status, _) = lifecycle(&pool, id, "start").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = lifecycle(&pool, id, "pause").await;
    assert_eq!(json["data"]["status"], "paused");
    let (_, json) = lifecycle(&pool, id, "resume").await;
    assert_eq!(json["data"]["status"], "active");
    assert_eq!(json["data"]["current_step_index"], 1);

    let (_, json) = lifecycle(&pool, id, "complete").await;
    assert_eq!(json["data"]["status"], "completed");
    assert!(json["data"]["completed_at"].is_string());

    for action in ["start", "pause", "resume", "complete"] {
        let (status, _) = lifecycle(&pool, id, action).await;
        assert_eq!(status, StatusCode::CONFLICT, "{action} on completed");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_expected_version_is_a_concurrency_conflict(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;

    let response = post_json(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/assignments/{id}/start"),
        json!({ "expected_version": 0 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(data(response).await["version"], 1);

    // Checked before the state rule: pausing is allowed, the version is not.
    let response = post_json(
        common::build_test_app(pool),
        &format!("/api/v1/assignments/{id}/pause"),
        json!({ "expected_version": 0 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "CONCURRENCY_CONFLICT");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn racing_pauses_let_exactly_one_through(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;
    lifecycle(&pool, id, "start").await;

    let pause = |pool: PgPool| async move {
        post_empty(
            common::build_test_app(pool),
            &format!("/api/v1/assignments/{id}/pause"),
        )
        .await
    };
    let first = tokio::spawn(pause(pool.clone()));
    let second = tokio::spawn(pause(pool.clone()));
    let statuses = [
        first.await.unwrap().status(),
        second.await.unwrap().status(),
    ];

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(),
        1
    );

    let response = get(
        common::build_test_app(pool),
        &format!("/api/v1/assignments/{id}"),
    )
    .await;
    let assignment = data(response).await;
    assert_eq!(assignment["status"], "paused");
    assert_eq!(assignment["version"], 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn daily_meds_end_to_end(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;
    let (_, started) = lifecycle(&pool, id, "start").await;
    let started_at = timestamp(&started["data"]["started_at"]);

    // The delivery collaborator finds step 1 due immediately.
    let due_uri = format!(
        "/api/v1/assignments/due?before={}",
        (started_at + Duration::seconds(1)).format("%Y-%m-%dT%H:%M:%SZ")
    );
    let response = get(common::build_test_app(pool.clone()), &due_uri).await;
    let due = data(response).await;
    assert_eq!(due.as_array().unwrap().len(), 1);
    assert_eq!(due[0]["id"], id);

    let sent1 = started_at + Duration::minutes(1);
    let (status, json) = record(
        &pool,
        id,
        json!({ "step_index": 1, "kind": "sent", "occurred_at": sent1 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["outcome"]["advanced"], true);
    let assignment = &json["data"]["assignment"];
    assert_eq!(assignment["current_step_index"], 2);
    assert_eq!(timestamp(&assignment["next_fire_at"]), sent1 + Duration::minutes(60));

    let sent2 = sent1 + Duration::minutes(60);
    let (_, json) = record(
        &pool,
        id,
        json!({ "step_index": 2, "kind": "sent", "occurred_at": sent2 }),
    )
    .await;
    assert_eq!(json["data"]["outcome"]["advanced"], false);
    assert_eq!(json["data"]["assignment"]["adherence_rate"], 50.0);
    assert_eq!(json["data"]["assignment"]["next_fire_at"], Value::Null);

    // Waiting on the patient: not due again, and a second send is refused.
    let due_uri = format!(
        "/api/v1/assignments/due?before={}",
        (sent2 + Duration::hours(1)).format("%Y-%m-%dT%H:%M:%SZ")
    );
    let response = get(common::build_test_app(pool.clone()), &due_uri).await;
    assert!(data(response).await.as_array().unwrap().is_empty());
    let (status, json) = record(
        &pool,
        id,
        json!({ "step_index": 2, "kind": "sent", "occurred_at": sent2 + Duration::minutes(1) }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_STATE");

    // "later" postpones: recorded, no advance.
    let (_, json) = record(
        &pool,
        id,
        json!({ "step_index": 2, "kind": "responded", "occurred_at": sent2 + Duration::minutes(2), "value": "later" }),
    )
    .await;
    assert_eq!(json["data"]["outcome"]["action"], "postpone");
    assert_eq!(json["data"]["assignment"]["status"], "active");

    let (_, json) = record(
        &pool,
        id,
        json!({ "step_index": 2, "kind": "responded", "occurred_at": sent2 + Duration::minutes(4), "value": "yes" }),
    )
    .await;
    assert_eq!(json["data"]["outcome"]["completed"], true);
    let assignment = &json["data"]["assignment"];
    assert_eq!(assignment["status"], "completed");
    assert_eq!(assignment["completed_steps"], 2);
    assert_eq!(assignment["adherence_rate"], 100.0);
    assert_eq!(assignment["next_fire_at"], Value::Null);

    let response = get(
        common::build_test_app(pool),
        &format!("/api/v1/assignments/{id}/events"),
    )
    .await;
    let events = data(response).await;
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["sent", "sent", "responded", "responded"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rejected_events_are_not_recorded(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;

    let (status, json) = record(&pool, id, json!({ "step_index": 1, "kind": "sent" })).await;
    assert_eq!(status, StatusCode::CONFLICT, "not started yet");
    assert_eq!(json["code"], "INVALID_STATE");

    lifecycle(&pool, id, "start").await;
    let (status, _) = record(&pool, id, json!({ "step_index": 2, "kind": "sent" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = record(
        &pool,
        id,
        json!({ "step_index": 1, "kind": "responded", "value": "ok" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "step 1 was never sent");

    let (status, _) = record(&pool, 999_999, json!({ "step_index": 1, "kind": "sent" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = get(
        common::build_test_app(pool),
        &format!("/api/v1/assignments/{id}/events"),
    )
    .await;
    assert!(data(response).await.as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_removes_assignment(pool: PgPool) {
    let protocol_id = daily_meds(&pool).await;
    let patient_id = create_patient(&pool, "Mali").await;
    let id = assign(&pool, protocol_id, patient_id).await;

    let uri = format!("/api/v1/assignments/{id}");
    let response = delete(common::build_test_app(pool.clone()), &uri).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = get(common::build_test_app(pool.clone()), &uri).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The pair is free again.
    let response = post_json(
        common::build_test_app(pool),
        "/api/v1/assignments",
        json!({ "protocol_id": protocol_id, "patient_id": patient_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}
