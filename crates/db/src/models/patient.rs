//! Patient entity model and DTOs.

use careflow_core::error::CoreError;
use careflow_core::patient::PatientStatus;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `patients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Patient {
    pub id: DbId,
    pub display_name: String,
    pub real_name: Option<String>,
    pub hospital_number: Option<String>,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Patient {
    pub fn status(&self) -> Result<PatientStatus, CoreError> {
        PatientStatus::from_str_db(&self.status)
    }
}

/// DTO for creating a patient.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePatient {
    pub display_name: String,
    pub real_name: Option<String>,
    pub hospital_number: Option<String>,
}

/// Body of `PUT /api/v1/patients/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePatientStatus {
    pub status: PatientStatus,
}

/// Query parameters for `GET /api/v1/patients`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientListQuery {
    pub status: Option<String>,
    /// Case-insensitive match on display name, real name or hospital number.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
