//! Repository for the `protocol_assignments` table.
//!
//! Every state change locks the assignment row (`SELECT ... FOR UPDATE`)
//! for the duration of its transaction and writes back with a `version`
//! guard, so concurrent transitions on one assignment are serialized.

use careflow_core::assignment::{AssignmentProgress, AssignmentStatus};
use careflow_core::error::CoreError;
use careflow_core::patient::PatientStatus;
use careflow_core::step::ProtocolStep;
use careflow_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::error::DbError;
use crate::models::assignment::{Assignment, CreateAssignment};
use crate::repositories::{ProtocolRepo, ProtocolStepRepo};

/// Column list for `protocol_assignments` queries.
const COLUMNS: &str = "\
    id, protocol_id, patient_id, status, assigned_at, started_at, completed_at, \
    current_step_index, total_steps, completed_steps, last_sent_step, \
    adherence_rate, next_fire_at, version, created_at, updated_at";

/// Provides lifecycle operations for patient assignments.
pub struct AssignmentRepo;

impl AssignmentRepo {
    /// Assign an active protocol to an active patient.
    ///
    /// A second open assignment for the same pair violates
    /// `uq_protocol_assignments_open`.
    pub async fn create(pool: &PgPool, input: &CreateAssignment) -> Result<Assignment, DbError> {
        let mut tx = pool.begin().await?;

        let definition = ProtocolRepo::lock_definition(&mut *tx, input.protocol_id).await?;
        definition.ensure_assignable()?;

        let patient_status: String = sqlx::query_scalar("SELECT status FROM patients WHERE id = $1")
            .bind(input.patient_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Patient",
                id: input.patient_id,
            })?;
        if PatientStatus::from_str_db(&patient_status)? != PatientStatus::Active {
            return Err(CoreError::InvalidState(format!(
                "Patient {} is inactive and cannot be assigned",
                input.patient_id
            ))
            .into());
        }

        let query = format!(
            "INSERT INTO protocol_assignments (protocol_id, patient_id, status, total_steps) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let assignment = sqlx::query_as::<_, Assignment>(&query)
            .bind(input.protocol_id)
            .bind(input.patient_id)
            .bind(AssignmentStatus::Assigned.as_str())
            .bind(definition.total_steps())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id = assignment.id,
            protocol_id = assignment.protocol_id,
            patient_id = assignment.patient_id,
            "Protocol assigned"
        );
        Ok(assignment)
    }

    /// Find an assignment by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM protocol_assignments WHERE id = $1");
        sqlx::query_as::<_, Assignment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All assignments of a protocol, newest first.
    pub async fn list_for_protocol(
        pool: &PgPool,
        protocol_id: DbId,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM protocol_assignments \
             WHERE protocol_id = $1 \
             ORDER BY assigned_at DESC, id DESC"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(protocol_id)
            .fetch_all(pool)
            .await
    }

    /// All assignments of a patient, newest first.
    pub async fn list_for_patient(
        pool: &PgPool,
        patient_id: DbId,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM protocol_assignments \
             WHERE patient_id = $1 \
             ORDER BY assigned_at DESC, id DESC"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(patient_id)
            .fetch_all(pool)
            .await
    }

    /// Active assignments whose current step is due at or before `before`,
    /// earliest first.
    pub async fn list_due(
        pool: &PgPool,
        before: Timestamp,
        limit: Option<i64>,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let (limit, _) = super::page(limit, None);
        let query = format!(
            "SELECT {COLUMNS} FROM protocol_assignments \
             WHERE status = $1 AND next_fire_at <= $2 \
             ORDER BY next_fire_at, id \
             LIMIT $3"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(AssignmentStatus::Active.as_str())
            .bind(before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete an assignment and its events, whatever its status.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM protocol_assignments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply an operator transition under a row lock.
    ///
    /// `expected_version`, when given, must match the stored version before
    /// any state rule is checked.
    pub async fn transition<F>(
        pool: &PgPool,
        id: DbId,
        expected_version: Option<i32>,
        apply: F,
    ) -> Result<Assignment, DbError>
    where
        F: FnOnce(&mut AssignmentProgress, &[ProtocolStep]) -> Result<(), CoreError> + Send,
    {
        let mut tx = pool.begin().await?;
        let row = Self::lock(&mut *tx, id).await?;
        if let Some(expected) = expected_version {
            if expected != row.version {
                return Err(CoreError::ConcurrencyConflict {
                    entity: "Assignment",
                    id,
                }
                .into());
            }
        }

        let steps = ProtocolStepRepo::load_steps(&mut *tx, row.protocol_id).await?;
        let mut progress = row.progress()?;
        let from = progress.status;
        apply(&mut progress, &steps)?;

        let updated = Self::save_progress(&mut *tx, &row, &progress).await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id = id,
            protocol_id = updated.protocol_id,
            from = from.as_str(),
            to = progress.status.as_str(),
            "Assignment status changed"
        );
        Ok(updated)
    }

    /// Lock an assignment row for the rest of the transaction.
    pub(crate) async fn lock(conn: &mut PgConnection, id: DbId) -> Result<Assignment, DbError> {
        let query = format!("SELECT {COLUMNS} FROM protocol_assignments WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, Assignment>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Assignment",
                id,
            })?;
        Ok(row)
    }

    /// Write `progress` back to the row read as `row`, bumping its version.
    pub(crate) async fn save_progress(
        conn: &mut PgConnection,
        row: &Assignment,
        progress: &AssignmentProgress,
    ) -> Result<Assignment, DbError> {
        let query = format!(
            "UPDATE protocol_assignments SET \
                status = $3, started_at = $4, completed_at = $5, \
                current_step_index = $6, total_steps = $7, completed_steps = $8, \
                last_sent_step = $9, adherence_rate = $10, next_fire_at = $11, \
                version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(row.id)
            .bind(row.version)
            .bind(progress.status.as_str())
            .bind(progress.started_at)
            .bind(progress.completed_at)
            .bind(progress.current_step_index)
            .bind(progress.total_steps)
            .bind(progress.completed_steps)
            .bind(progress.last_sent_step)
            .bind(progress.adherence_rate)
            .bind(progress.next_fire_at)
            .fetch_optional(conn)
            .await?
            .ok_or(DbError::Core(CoreError::ConcurrencyConflict {
                entity: "Assignment",
                id: row.id,
            }))
    }
}
