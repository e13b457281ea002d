//! Read models for research aggregates and exports.

use careflow_core::adherence::AssignmentFact;
use careflow_core::assignment::AssignmentStatus;
use careflow_core::error::CoreError;
use careflow_core::export::ExportRow;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::patient::Patient;

/// Assignment counters projected for adherence reductions.
#[derive(Debug, Clone, FromRow)]
pub struct AssignmentFactRow {
    pub id: DbId,
    pub protocol_id: DbId,
    pub patient_id: DbId,
    pub status: String,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub last_sent_step: i32,
}

impl AssignmentFactRow {
    pub fn fact(&self) -> Result<AssignmentFact, CoreError> {
        Ok(AssignmentFact {
            assignment_id: self.id,
            protocol_id: self.protocol_id,
            patient_id: self.patient_id,
            status: AssignmentStatus::from_str_db(&self.status)?,
            total_steps: self.total_steps,
            completed_steps: self.completed_steps,
            last_sent_step: self.last_sent_step,
        })
    }
}

/// A patient with their overall adherence.
#[derive(Debug, Clone, Serialize)]
pub struct PatientAdherence {
    #[serde(flatten)]
    pub patient: Patient,
    pub assignment_count: i64,
    pub overall_adherence_rate: Option<f64>,
}

/// One joined export line as read from the database.
#[derive(Debug, Clone, FromRow)]
pub struct ExportRecord {
    pub event_id: DbId,
    pub assignment_id: DbId,
    pub assignment_status: String,
    pub patient_id: DbId,
    pub patient_name: String,
    pub hospital_number: Option<String>,
    pub protocol_id: DbId,
    pub protocol_name: String,
    pub step_index: i32,
    pub event_kind: String,
    pub occurred_at: Timestamp,
    pub value: Option<String>,
}

impl From<ExportRecord> for ExportRow {
    fn from(r: ExportRecord) -> Self {
        ExportRow {
            event_id: r.event_id,
            assignment_id: r.assignment_id,
            assignment_status: r.assignment_status,
            patient_id: r.patient_id,
            patient_name: r.patient_name,
            hospital_number: r.hospital_number,
            protocol_id: r.protocol_id,
            protocol_name: r.protocol_name,
            step_index: r.step_index,
            event_kind: r.event_kind,
            occurred_at: r.occurred_at,
            value: r.value,
        }
    }
}

/// Query parameters for `GET /api/v1/research/export`; also the body of
/// the `POST` variant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    pub protocol_id: Option<DbId>,
    /// `csv` or `json` (default).
    pub format: Option<String>,
}
