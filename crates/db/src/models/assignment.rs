//! Assignment entity model and DTOs.

use careflow_core::assignment::{AssignmentProgress, AssignmentStatus};
use careflow_core::error::CoreError;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `protocol_assignments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Assignment {
    pub id: DbId,
    pub protocol_id: DbId,
    pub patient_id: DbId,
    pub status: String,
    pub assigned_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub current_step_index: i32,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub last_sent_step: i32,
    pub adherence_rate: Option<f64>,
    pub next_fire_at: Option<Timestamp>,
    pub version: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Assignment {
    pub fn status(&self) -> Result<AssignmentStatus, CoreError> {
        AssignmentStatus::from_str_db(&self.status)
    }

    /// The lifecycle state held by this row.
    pub fn progress(&self) -> Result<AssignmentProgress, CoreError> {
        Ok(AssignmentProgress {
            status: self.status()?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            current_step_index: self.current_step_index,
            total_steps: self.total_steps,
            completed_steps: self.completed_steps,
            last_sent_step: self.last_sent_step,
            adherence_rate: self.adherence_rate,
            next_fire_at: self.next_fire_at,
        })
    }
}

/// DTO for `POST /api/v1/assignments`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssignment {
    pub patient_id: DbId,
    pub protocol_id: DbId,
}

/// Optional body of the assignment transition endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionRequest {
    /// Reject the transition unless the row is still at this version.
    pub expected_version: Option<i32>,
}

/// Query parameters for `GET /api/v1/assignments/due`.
#[derive(Debug, Clone, Deserialize)]
pub struct DueQuery {
    /// Upper bound on `next_fire_at`. Defaults to now.
    pub before: Option<Timestamp>,
    pub limit: Option<i64>,
}
