//! Repository for the append-only `step_events` table.

use careflow_core::assignment::StepEventInput;
use careflow_core::types::{DbId, Timestamp};
use chrono::FixedOffset;
use sqlx::PgPool;

use crate::error::DbError;
use crate::models::step_event::{CreateStepEvent, RecordedEvent, StepEvent};
use crate::repositories::{AssignmentRepo, ProtocolStepRepo};

/// Column list for `step_events` queries.
const COLUMNS: &str = "id, assignment_id, step_index, kind, occurred_at, value, created_at";

/// Appends and reads step events.
pub struct StepEventRepo;

impl StepEventRepo {
    /// Events of one assignment in the order they occurred.
    pub async fn list_for_assignment(
        pool: &PgPool,
        assignment_id: DbId,
    ) -> Result<Vec<StepEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM step_events \
             WHERE assignment_id = $1 \
             ORDER BY occurred_at, id"
        );
        sqlx::query_as::<_, StepEvent>(&query)
            .bind(assignment_id)
            .fetch_all(pool)
            .await
    }

    /// Record a step event and apply its effect on the assignment in one
    /// transaction. Nothing is written if the event is rejected.
    ///
    /// `now` stamps events without an explicit time and completion times;
    /// `schedule_tz` resolves scheduled triggers of the next step.
    pub async fn append(
        pool: &PgPool,
        assignment_id: DbId,
        input: &CreateStepEvent,
        now: Timestamp,
        schedule_tz: FixedOffset,
    ) -> Result<RecordedEvent, DbError> {
        let mut tx = pool.begin().await?;
        let row = AssignmentRepo::lock(&mut *tx, assignment_id).await?;
        let steps = ProtocolStepRepo::load_steps(&mut *tx, row.protocol_id).await?;

        let event = StepEventInput {
            step_index: input.step_index,
            kind: input.kind,
            occurred_at: input.occurred_at.unwrap_or(now),
            value: input.value.clone(),
        };
        let mut progress = row.progress()?;
        let outcome = progress.record_event(&event, &steps, now, &schedule_tz)?;

        let query = format!(
            "INSERT INTO step_events (assignment_id, step_index, kind, occurred_at, value) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let stored = sqlx::query_as::<_, StepEvent>(&query)
            .bind(assignment_id)
            .bind(event.step_index)
            .bind(event.kind.as_str())
            .bind(event.occurred_at)
            .bind(event.value.as_deref())
            .fetch_one(&mut *tx)
            .await?;

        let assignment = AssignmentRepo::save_progress(&mut *tx, &row, &progress).await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id,
            step_index = event.step_index,
            kind = event.kind.as_str(),
            advanced = outcome.advanced,
            completed = outcome.completed,
            "Step event recorded"
        );
        Ok(RecordedEvent {
            event: stored,
            assignment,
            outcome,
        })
    }
}
