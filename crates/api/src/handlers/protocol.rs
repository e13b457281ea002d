//! Handlers for the `/protocols` resource and its lifecycle.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use careflow_core::adherence::ProtocolAdherence;
use careflow_core::error::CoreError;
use careflow_core::protocol::ProtocolDefinition;
use careflow_core::types::DbId;
use careflow_db::models::assignment::Assignment;
use careflow_db::models::protocol::{
    CreateProtocol, Protocol, ProtocolListQuery, ProtocolWithSteps, UpdateProtocol,
    ValidationReport,
};
use careflow_db::repositories::{AssignmentRepo, ProtocolRepo, ResearchRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::context::RequestContext;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Protocol",
        id,
    })
}

fn require_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::validation("protocol name is required").into());
    }
    Ok(())
}

/// Fail with 404 unless the protocol exists.
pub(crate) async fn ensure_exists(state: &AppState, id: DbId) -> AppResult<Protocol> {
    ProtocolRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /api/v1/protocols
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ProtocolListQuery>,
) -> AppResult<Json<DataResponse<Vec<Protocol>>>> {
    let protocols = ProtocolRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: protocols }))
}

/// POST /api/v1/protocols
///
/// New protocols are always drafts. The caller's operator id is recorded
/// as `created_by`.
pub async fn create(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(input): Json<CreateProtocol>,
) -> AppResult<(StatusCode, Json<DataResponse<Protocol>>)> {
    require_name(&input.name)?;
    let protocol = ProtocolRepo::create(&state.pool, &input, ctx.operator()).await?;

    tracing::info!(
        protocol_id = protocol.id,
        operator = ?ctx.operator(),
        "Protocol created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: protocol })))
}

/// GET /api/v1/protocols/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    let protocol = ensure_exists(&state, id).await?;
    Ok(Json(DataResponse { data: protocol }))
}

/// GET /api/v1/protocols/{id}/with-steps
pub async fn get_with_steps(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProtocolWithSteps>>> {
    let protocol = ProtocolRepo::find_with_steps(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: protocol }))
}

/// PUT /api/v1/protocols/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProtocol>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    if let Some(name) = &input.name {
        require_name(name)?;
    }
    let protocol = ProtocolRepo::update(&state.pool, id, &input)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: protocol }))
}

/// DELETE /api/v1/protocols/{id}
///
/// Cascades to steps, assignments and their events.
pub async fn delete(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if ProtocolRepo::delete(&state.pool, id).await? {
        tracing::info!(protocol_id = id, operator = ?ctx.operator(), "Protocol deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

// ---------------------------------------------------------------------------
// Validation and lifecycle
// ---------------------------------------------------------------------------

/// GET /api/v1/protocols/{id}/validate
///
/// Reports every violation without changing anything.
pub async fn validate(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ValidationReport>>> {
    let definition = ProtocolRepo::load_definition(&state.pool, id).await?;
    let report = ValidationReport::from_violations(definition.violations());
    Ok(Json(DataResponse { data: report }))
}

async fn transition<F>(
    state: &AppState,
    ctx: &RequestContext,
    id: DbId,
    apply: F,
) -> AppResult<Json<DataResponse<Protocol>>>
where
    F: FnOnce(&mut ProtocolDefinition) -> Result<(), CoreError> + Send,
{
    let protocol = ProtocolRepo::transition(&state.pool, id, apply).await?;
    tracing::debug!(protocol_id = id, operator = ?ctx.operator(), "Protocol transition applied");
    Ok(Json(DataResponse { data: protocol }))
}

/// POST /api/v1/protocols/{id}/activate
pub async fn activate(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    transition(&state, &ctx, id, ProtocolDefinition::activate).await
}

/// POST /api/v1/protocols/{id}/pause
pub async fn pause(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    transition(&state, &ctx, id, ProtocolDefinition::pause).await
}

/// POST /api/v1/protocols/{id}/resume
pub async fn resume(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    transition(&state, &ctx, id, ProtocolDefinition::resume).await
}

/// POST /api/v1/protocols/{id}/revert-to-draft
pub async fn revert_to_draft(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    transition(&state, &ctx, id, ProtocolDefinition::revert_to_draft).await
}

/// POST /api/v1/protocols/{id}/complete
pub async fn complete(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Protocol>>> {
    transition(&state, &ctx, id, ProtocolDefinition::complete).await
}

// ---------------------------------------------------------------------------
// Related reads
// ---------------------------------------------------------------------------

/// GET /api/v1/protocols/{id}/assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Assignment>>>> {
    ensure_exists(&state, id).await?;
    let assignments = AssignmentRepo::list_for_protocol(&state.pool, id).await?;
    Ok(Json(DataResponse { data: assignments }))
}

/// GET /api/v1/protocols/{id}/adherence
pub async fn adherence(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProtocolAdherence>>> {
    let metrics = ResearchRepo::protocol_adherence(&state.pool, id).await?;
    Ok(Json(DataResponse { data: metrics }))
}
