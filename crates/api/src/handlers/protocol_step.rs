//! Handlers for the steps of a draft protocol.
//!
//! Every edit runs through [`ProtocolStepRepo::edit`], which locks the
//! protocol, rejects non-drafts and keeps step orders dense.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use careflow_core::protocol::MoveOutcome;
use careflow_core::step::StepSpec;
use careflow_core::types::DbId;
use careflow_db::models::protocol_step::{MoveStep, ProtocolStepRow, ReplaceSteps};
use careflow_db::repositories::ProtocolStepRepo;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::handlers::protocol::ensure_exists;
use crate::response::DataResponse;
use crate::state::AppState;

/// Result of a move request.
#[derive(Debug, Serialize)]
pub struct MoveResult {
    #[serde(flatten)]
    pub outcome: MoveOutcome,
    pub steps: Vec<ProtocolStepRow>,
}

fn step_row(rows: Vec<ProtocolStepRow>, order: i32) -> AppResult<ProtocolStepRow> {
    rows.into_iter()
        .find(|r| r.step_order == order)
        .ok_or_else(|| AppError::InternalError(format!("step {order} missing after save")))
}

/// GET /api/v1/protocols/{id}/steps
pub async fn list(
    State(state): State<AppState>,
    Path(protocol_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ProtocolStepRow>>>> {
    ensure_exists(&state, protocol_id).await?;
    let steps = ProtocolStepRepo::list_for_protocol(&state.pool, protocol_id).await?;
    Ok(Json(DataResponse { data: steps }))
}

/// POST /api/v1/protocols/{id}/steps
///
/// Appends a step at order `N + 1`.
pub async fn append(
    State(state): State<AppState>,
    Path(protocol_id): Path<DbId>,
    Json(spec): Json<StepSpec>,
) -> AppResult<(StatusCode, Json<DataResponse<ProtocolStepRow>>)> {
    let (order, rows) =
        ProtocolStepRepo::edit(&state.pool, protocol_id, |def| Ok(def.add_step(spec))).await?;
    let step = step_row(rows, order)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: step })))
}

/// PUT /api/v1/protocols/{id}/steps
///
/// Replaces the whole list. Rows whose order survives are updated in
/// place, so recorded events stay attached to their step index.
pub async fn replace(
    State(state): State<AppState>,
    Path(protocol_id): Path<DbId>,
    Json(input): Json<ReplaceSteps>,
) -> AppResult<Json<DataResponse<Vec<ProtocolStepRow>>>> {
    let (diff, rows) = ProtocolStepRepo::edit(&state.pool, protocol_id, |def| {
        Ok(def.replace_steps(input.steps))
    })
    .await?;

    tracing::info!(
        protocol_id,
        updated = diff.updated.len(),
        inserted = diff.inserted.len(),
        removed = diff.removed.len(),
        "Protocol steps replaced"
    );
    Ok(Json(DataResponse { data: rows }))
}

/// PUT /api/v1/protocols/{id}/steps/{order}
pub async fn update(
    State(state): State<AppState>,
    Path((protocol_id, order)): Path<(DbId, i32)>,
    Json(spec): Json<StepSpec>,
) -> AppResult<Json<DataResponse<ProtocolStepRow>>> {
    let ((), rows) =
        ProtocolStepRepo::edit(&state.pool, protocol_id, |def| def.update_step(order, spec))
            .await?;
    let step = step_row(rows, order)?;
    Ok(Json(DataResponse { data: step }))
}

/// DELETE /api/v1/protocols/{id}/steps/{order}
///
/// Later steps shift up by one.
pub async fn remove(
    State(state): State<AppState>,
    Path((protocol_id, order)): Path<(DbId, i32)>,
) -> AppResult<StatusCode> {
    ProtocolStepRepo::edit(&state.pool, protocol_id, |def| def.remove_step(order)).await?;
    tracing::info!(protocol_id, order, "Protocol step removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/protocols/{id}/steps/{order}/move
///
/// Moving past either end is a no-op reported as `at_boundary`.
pub async fn move_step(
    State(state): State<AppState>,
    Path((protocol_id, order)): Path<(DbId, i32)>,
    Json(input): Json<MoveStep>,
) -> AppResult<Json<DataResponse<MoveResult>>> {
    let (outcome, steps) = ProtocolStepRepo::edit(&state.pool, protocol_id, |def| {
        def.move_step(order, input.direction)
    })
    .await?;
    Ok(Json(DataResponse {
        data: MoveResult { outcome, steps },
    }))
}
