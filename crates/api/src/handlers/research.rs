//! Read-only research aggregates and the event log export.

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use careflow_core::adherence::{DashboardMetrics, ProtocolAdherence};
use careflow_core::export::{rows_to_csv, ExportFormat};
use careflow_core::types::DbId;
use careflow_db::models::research::{ExportQuery, PatientAdherence};
use careflow_db::repositories::ResearchRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/research/metrics
pub async fn metrics(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<DashboardMetrics>>> {
    let summary = ResearchRepo::dashboard(&state.pool).await?;
    Ok(Json(DataResponse { data: summary }))
}

/// GET /api/v1/research/adherence/{protocol_id}
pub async fn protocol_adherence(
    State(state): State<AppState>,
    Path(protocol_id): Path<DbId>,
) -> AppResult<Json<DataResponse<ProtocolAdherence>>> {
    let metrics = ResearchRepo::protocol_adherence(&state.pool, protocol_id).await?;
    Ok(Json(DataResponse { data: metrics }))
}

/// GET /api/v1/research/patients
pub async fn patients(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<PatientAdherence>>>> {
    let patients = ResearchRepo::patient_adherence(&state.pool).await?;
    Ok(Json(DataResponse { data: patients }))
}

/// GET /api/v1/research/export?protocol_id=&format=
pub async fn export_get(
    State(state): State<AppState>,
    Query(params): Query<ExportQuery>,
) -> AppResult<Response> {
    export(&state, params).await
}

/// POST /api/v1/research/export
pub async fn export_post(
    State(state): State<AppState>,
    Json(params): Json<ExportQuery>,
) -> AppResult<Response> {
    export(&state, params).await
}

/// CSV downloads as an attachment; JSON uses the usual envelope.
async fn export(state: &AppState, params: ExportQuery) -> AppResult<Response> {
    let format = ExportFormat::parse(params.format.as_deref())?;
    let rows = ResearchRepo::export(&state.pool, params.protocol_id).await?;

    tracing::info!(
        protocol_id = ?params.protocol_id,
        rows = rows.len(),
        format = ?format,
        "Research export generated"
    );

    Ok(match format {
        ExportFormat::Csv => (
            [
                (CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    CONTENT_DISPOSITION,
                    "attachment; filename=\"careflow-export.csv\"",
                ),
            ],
            rows_to_csv(&rows),
        )
            .into_response(),
        ExportFormat::Json => Json(DataResponse { data: rows }).into_response(),
    })
}
