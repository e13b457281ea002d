//! Step event log rows.

use careflow_core::adherence::EventFact;
use careflow_core::assignment::{EventOutcome, StepEventKind};
use careflow_core::error::CoreError;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::assignment::Assignment;

/// A row from the `step_events` table. Rows are never updated.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StepEvent {
    pub id: DbId,
    pub assignment_id: DbId,
    pub step_index: i32,
    pub kind: String,
    pub occurred_at: Timestamp,
    pub value: Option<String>,
    pub created_at: Timestamp,
}

impl StepEvent {
    pub fn fact(&self) -> Result<EventFact, CoreError> {
        Ok(EventFact {
            assignment_id: self.assignment_id,
            step_index: self.step_index,
            kind: StepEventKind::from_str_db(&self.kind)?,
            occurred_at: self.occurred_at,
        })
    }
}

/// DTO for `POST /api/v1/assignments/{id}/events`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStepEvent {
    pub step_index: i32,
    pub kind: StepEventKind,
    /// Defaults to the time the request is handled.
    pub occurred_at: Option<Timestamp>,
    pub value: Option<String>,
}

/// An appended event together with the assignment it moved.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub event: StepEvent,
    pub assignment: Assignment,
    pub outcome: EventOutcome,
}
