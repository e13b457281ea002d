//! Handlers for protocol assignments and their step events.
//!
//! Transitions and event appends lock the assignment row for the duration
//! of the write, so concurrent requests on the same assignment serialize.
//! A racing request that loses sees the committed state and fails with
//! `INVALID_STATE` (or `CONCURRENCY_CONFLICT` when it sent a stale
//! `expected_version`).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use careflow_core::assignment::AssignmentProgress;
use careflow_core::error::CoreError;
use careflow_core::step::ProtocolStep;
use careflow_core::types::DbId;
use careflow_db::models::assignment::{Assignment, CreateAssignment, DueQuery, TransitionRequest};
use careflow_db::models::step_event::{CreateStepEvent, RecordedEvent, StepEvent};
use careflow_db::repositories::{AssignmentRepo, StepEventRepo};
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::middleware::context::RequestContext;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Assignment",
        id,
    })
}

async fn ensure_exists(state: &AppState, id: DbId) -> AppResult<Assignment> {
    AssignmentRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// POST /api/v1/assignments
///
/// The protocol must be active and the patient active. A second open
/// assignment of the same protocol to the same patient is a 409.
pub async fn create(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(input): Json<CreateAssignment>,
) -> AppResult<(StatusCode, Json<DataResponse<Assignment>>)> {
    let assignment = AssignmentRepo::create(&state.pool, &input).await?;

    tracing::info!(
        assignment_id = assignment.id,
        protocol_id = assignment.protocol_id,
        patient_id = assignment.patient_id,
        operator = ?ctx.operator(),
        "Protocol assigned"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: assignment })))
}

/// GET /api/v1/assignments/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Assignment>>> {
    let assignment = ensure_exists(&state, id).await?;
    Ok(Json(DataResponse { data: assignment }))
}

/// DELETE /api/v1/assignments/{id}
pub async fn delete(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if AssignmentRepo::delete(&state.pool, id).await? {
        tracing::info!(assignment_id = id, operator = ?ctx.operator(), "Assignment deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

/// GET /api/v1/assignments/due
///
/// Active assignments whose current step fires at or before `before`
/// (default: now), earliest first. Polled by the delivery collaborator.
pub async fn list_due(
    State(state): State<AppState>,
    Query(params): Query<DueQuery>,
) -> AppResult<Json<DataResponse<Vec<Assignment>>>> {
    let before = params.before.unwrap_or_else(Utc::now);
    let due = AssignmentRepo::list_due(&state.pool, before, params.limit).await?;
    Ok(Json(DataResponse { data: due }))
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

async fn transition<F>(
    state: &AppState,
    ctx: &RequestContext,
    id: DbId,
    body: Option<Json<TransitionRequest>>,
    apply: F,
) -> AppResult<Json<DataResponse<Assignment>>>
where
    F: FnOnce(&mut AssignmentProgress, &[ProtocolStep]) -> Result<(), CoreError> + Send,
{
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let assignment =
        AssignmentRepo::transition(&state.pool, id, request.expected_version, apply).await?;
    tracing::debug!(assignment_id = id, operator = ?ctx.operator(), "Assignment transition applied");
    Ok(Json(DataResponse { data: assignment }))
}

/// POST /api/v1/assignments/{id}/start
///
/// Schedules step 1 relative to the time of the request.
pub async fn start(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<DataResponse<Assignment>>> {
    let now = Utc::now();
    let tz = state.config.schedule_offset;
    transition(&state, &ctx, id, body, move |progress, steps| {
        progress.start(steps, now, &tz)
    })
    .await
}

/// POST /api/v1/assignments/{id}/pause
pub async fn pause(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<DataResponse<Assignment>>> {
    transition(&state, &ctx, id, body, |progress, _| progress.pause()).await
}

/// POST /api/v1/assignments/{id}/resume
pub async fn resume(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<DataResponse<Assignment>>> {
    transition(&state, &ctx, id, body, |progress, _| progress.resume()).await
}

/// POST /api/v1/assignments/{id}/complete
///
/// Operator override that ends the run early.
pub async fn complete(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<DataResponse<Assignment>>> {
    let now = Utc::now();
    transition(&state, &ctx, id, body, move |progress, _| progress.complete(now)).await
}

// ---------------------------------------------------------------------------
// Step events
// ---------------------------------------------------------------------------

/// GET /api/v1/assignments/{id}/events
pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<StepEvent>>>> {
    ensure_exists(&state, id).await?;
    let events = StepEventRepo::list_for_assignment(&state.pool, id).await?;
    Ok(Json(DataResponse { data: events }))
}

/// POST /api/v1/assignments/{id}/events
///
/// Appends a `sent` or `responded` event. Advancing the assignment is a
/// side effect of the append and happens in the same transaction.
pub async fn record_event(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateStepEvent>,
) -> AppResult<(StatusCode, Json<DataResponse<RecordedEvent>>)> {
    let recorded =
        StepEventRepo::append(&state.pool, id, &input, Utc::now(), state.config.schedule_offset)
            .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: recorded })))
}
