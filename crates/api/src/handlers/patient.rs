//! Handlers for the `/patients` directory.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use careflow_core::error::CoreError;
use careflow_core::patient::validate_display_name;
use careflow_core::types::DbId;
use careflow_db::models::assignment::Assignment;
use careflow_db::models::patient::{CreatePatient, Patient, PatientListQuery, UpdatePatientStatus};
use careflow_db::repositories::{AssignmentRepo, PatientRepo};

use crate::error::{AppError, AppResult};
use crate::middleware::context::RequestContext;
use crate::response::DataResponse;
use crate::state::AppState;

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Patient",
        id,
    })
}

/// GET /api/v1/patients
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<PatientListQuery>,
) -> AppResult<Json<DataResponse<Vec<Patient>>>> {
    let patients = PatientRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: patients }))
}

/// POST /api/v1/patients
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreatePatient>,
) -> AppResult<(StatusCode, Json<DataResponse<Patient>>)> {
    validate_display_name(&input.display_name)?;
    let patient = PatientRepo::create(&state.pool, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: patient })))
}

/// GET /api/v1/patients/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Patient>>> {
    let patient = PatientRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse { data: patient }))
}

/// PUT /api/v1/patients/{id}/status
///
/// Deactivating a patient blocks new assignments; running ones continue.
pub async fn update_status(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePatientStatus>,
) -> AppResult<Json<DataResponse<Patient>>> {
    let patient = PatientRepo::update_status(&state.pool, id, input.status)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(
        patient_id = id,
        status = input.status.as_str(),
        operator = ?ctx.operator(),
        "Patient status changed"
    );
    Ok(Json(DataResponse { data: patient }))
}

/// GET /api/v1/patients/{id}/assignments
pub async fn list_assignments(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Assignment>>>> {
    PatientRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;
    let assignments = AssignmentRepo::list_for_patient(&state.pool, id).await?;
    Ok(Json(DataResponse { data: assignments }))
}
