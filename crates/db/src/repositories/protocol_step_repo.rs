//! Repository for the `protocol_steps` table.
//!
//! Steps are never written one at a time from outside: every edit runs
//! through [`ProtocolStepRepo::edit`], which applies a domain edit to the
//! locked definition and persists only the rows that changed.

use careflow_core::error::CoreError;
use careflow_core::protocol::{diff_steps, ProtocolDefinition, StepDiff};
use careflow_core::step::{ProtocolStep, StepSpec};
use careflow_core::types::DbId;
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::error::DbError;
use crate::models::protocol_step::ProtocolStepRow;
use crate::repositories::ProtocolRepo;

/// Column list for `protocol_steps` queries.
const COLUMNS: &str = "\
    id, protocol_id, step_order, trigger_type, trigger_value, message_type, \
    content_payload, requires_action, feedback_config, created_at, updated_at";

/// Provides read access and diff-applied edits for protocol steps.
pub struct ProtocolStepRepo;

impl ProtocolStepRepo {
    /// All steps of a protocol in order.
    pub async fn list_for_protocol<'e>(
        executor: impl PgExecutor<'e>,
        protocol_id: DbId,
    ) -> Result<Vec<ProtocolStepRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM protocol_steps \
             WHERE protocol_id = $1 \
             ORDER BY step_order"
        );
        sqlx::query_as::<_, ProtocolStepRow>(&query)
            .bind(protocol_id)
            .fetch_all(executor)
            .await
    }

    /// Domain steps of a protocol in order.
    ///
    /// Holds a share lock on the protocol row until the transaction ends, so
    /// the step list cannot be edited under an assignment that is moving.
    pub async fn load_steps(
        conn: &mut PgConnection,
        protocol_id: DbId,
    ) -> Result<Vec<ProtocolStep>, DbError> {
        sqlx::query("SELECT id FROM protocols WHERE id = $1 FOR SHARE")
            .bind(protocol_id)
            .execute(&mut *conn)
            .await?;
        let rows = Self::list_for_protocol(conn, protocol_id).await?;
        Ok(rows
            .iter()
            .map(ProtocolStepRow::to_step)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Run `edit` against the locked draft definition and persist the
    /// resulting step list.
    ///
    /// Returns the edit's result and the protocol's step rows afterwards.
    /// Rows are updated in place where their order survives, so events
    /// recorded against a step index keep pointing at that index.
    pub async fn edit<T, F>(
        pool: &PgPool,
        protocol_id: DbId,
        edit: F,
    ) -> Result<(T, Vec<ProtocolStepRow>), DbError>
    where
        F: FnOnce(&mut ProtocolDefinition) -> Result<T, CoreError> + Send,
        T: Send,
    {
        let mut tx = pool.begin().await?;
        let mut definition = ProtocolRepo::lock_definition(&mut *tx, protocol_id).await?;
        definition.ensure_editable()?;

        let before = definition.steps.clone();
        let result = edit(&mut definition)?;
        Self::ensure_reached_steps_kept(&mut *tx, protocol_id, definition.steps.len()).await?;
        let diff = diff_steps(&before, &definition.steps);
        let rejected: Vec<String> = definition
            .steps
            .iter()
            .filter(|s| diff.updated.contains(&s.step_order) || diff.inserted.contains(&s.step_order))
            .flat_map(|s| s.spec.draft_violations(s.step_order))
            .collect();
        if !rejected.is_empty() {
            return Err(CoreError::Validation(rejected).into());
        }

        if !diff.is_empty() {
            Self::apply_diff(&mut *tx, protocol_id, &definition.steps, &diff).await?;
            sqlx::query("UPDATE protocols SET updated_at = NOW() WHERE id = $1")
                .bind(protocol_id)
                .execute(&mut *tx)
                .await?;
        }

        let rows = Self::list_for_protocol(&mut *tx, protocol_id).await?;
        tx.commit().await?;

        tracing::debug!(
            protocol_id,
            updated = diff.updated.len(),
            inserted = diff.inserted.len(),
            removed = diff.removed.len(),
            "Protocol steps saved"
        );
        Ok((result, rows))
    }

    /// Reject a step list shorter than the cursor of any running or paused
    /// assignment of the protocol.
    async fn ensure_reached_steps_kept(
        conn: &mut PgConnection,
        protocol_id: DbId,
        step_count: usize,
    ) -> Result<(), DbError> {
        let reached: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(current_step_index), 0) FROM protocol_assignments \
             WHERE protocol_id = $1 AND status IN ('active', 'paused')",
        )
        .bind(protocol_id)
        .fetch_one(conn)
        .await?;

        if usize::try_from(reached).unwrap_or(0) > step_count {
            return Err(CoreError::InvalidState(format!(
                "an open assignment has reached step {reached}; \
                 the protocol cannot shrink to {step_count} steps"
            ))
            .into());
        }
        Ok(())
    }

    async fn apply_diff(
        conn: &mut PgConnection,
        protocol_id: DbId,
        steps: &[ProtocolStep],
        diff: &StepDiff,
    ) -> Result<(), DbError> {
        if !diff.removed.is_empty() {
            sqlx::query("DELETE FROM protocol_steps WHERE protocol_id = $1 AND step_order = ANY($2)")
                .bind(protocol_id)
                .bind(&diff.removed)
                .execute(&mut *conn)
                .await?;
        }

        for step in steps {
            if diff.updated.contains(&step.step_order) {
                Self::update_row(&mut *conn, protocol_id, step).await?;
            } else if diff.inserted.contains(&step.step_order) {
                Self::insert_row(&mut *conn, protocol_id, step).await?;
            }
        }
        Ok(())
    }

    async fn insert_row(
        conn: &mut PgConnection,
        protocol_id: DbId,
        step: &ProtocolStep,
    ) -> Result<(), DbError> {
        let spec = &step.spec;
        sqlx::query(
            "INSERT INTO protocol_steps \
                (protocol_id, step_order, trigger_type, trigger_value, message_type, \
                 content_payload, requires_action, feedback_config) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(protocol_id)
        .bind(step.step_order)
        .bind(spec.trigger_type.as_str())
        .bind(&spec.trigger_value)
        .bind(spec.message_type.as_str())
        .bind(&spec.content_payload)
        .bind(spec.requires_action)
        .bind(feedback_json(spec)?)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn update_row(
        conn: &mut PgConnection,
        protocol_id: DbId,
        step: &ProtocolStep,
    ) -> Result<(), DbError> {
        let spec = &step.spec;
        sqlx::query(
            "UPDATE protocol_steps SET \
                trigger_type = $3, trigger_value = $4, message_type = $5, \
                content_payload = $6, requires_action = $7, feedback_config = $8, \
                updated_at = NOW() \
             WHERE protocol_id = $1 AND step_order = $2",
        )
        .bind(protocol_id)
        .bind(step.step_order)
        .bind(spec.trigger_type.as_str())
        .bind(&spec.trigger_value)
        .bind(spec.message_type.as_str())
        .bind(&spec.content_payload)
        .bind(spec.requires_action)
        .bind(feedback_json(spec)?)
        .execute(conn)
        .await?;
        Ok(())
    }
}

fn feedback_json(spec: &StepSpec) -> Result<Option<serde_json::Value>, CoreError> {
    spec.feedback_config
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| CoreError::Internal(format!("failed to encode feedback config: {e}")))
}
