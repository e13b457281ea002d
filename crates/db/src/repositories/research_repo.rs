//! Read-only research aggregates.
//!
//! Each report loads its facts inside one `REPEATABLE READ READ ONLY`
//! transaction so it sees a single consistent snapshot while writers keep
//! going, then reduces them with `careflow_core::adherence`.

use std::collections::HashMap;

use careflow_core::adherence::{
    dashboard_summary, patient_adherence_rate, protocol_metrics, AssignmentFact,
    DashboardMetrics, EventFact, ProtocolAdherence,
};
use careflow_core::error::CoreError;
use careflow_core::export::ExportRow;
use careflow_core::types::DbId;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::error::DbError;
use crate::models::patient::Patient;
use crate::models::research::{AssignmentFactRow, ExportRecord, PatientAdherence};
use crate::models::step_event::StepEvent;
use crate::repositories::patient_repo;

const FACT_COLUMNS: &str = "\
    a.id, a.protocol_id, a.patient_id, a.status, \
    a.total_steps, a.completed_steps, a.last_sent_step";

const EVENT_COLUMNS: &str = "\
    e.id, e.assignment_id, e.step_index, e.kind, e.occurred_at, e.value, e.created_at";

/// Provides snapshot reads for dashboards, adherence reports and exports.
pub struct ResearchRepo;

impl ResearchRepo {
    /// Dashboard summary across all protocols and patients.
    pub async fn dashboard(pool: &PgPool) -> Result<DashboardMetrics, DbError> {
        let mut tx = Self::snapshot(pool).await?;

        let total_patients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(&mut *tx)
            .await?;
        let active_protocols: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM protocols WHERE status = 'active'")
                .fetch_one(&mut *tx)
                .await?;
        let assignments = Self::assignment_facts(&mut *tx, None).await?;
        let events = Self::event_facts(&mut *tx, None).await?;
        tx.commit().await?;

        Ok(dashboard_summary(
            total_patients,
            active_protocols,
            &assignments,
            &events,
        ))
    }

    /// Completion and per-step response metrics for one protocol.
    pub async fn protocol_adherence(
        pool: &PgPool,
        protocol_id: DbId,
    ) -> Result<ProtocolAdherence, DbError> {
        let mut tx = Self::snapshot(pool).await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM protocols WHERE id = $1)")
            .bind(protocol_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(CoreError::NotFound {
                entity: "Protocol",
                id: protocol_id,
            }
            .into());
        }

        let step_orders: Vec<i32> = sqlx::query_scalar(
            "SELECT step_order FROM protocol_steps WHERE protocol_id = $1 ORDER BY step_order",
        )
        .bind(protocol_id)
        .fetch_all(&mut *tx)
        .await?;
        let assignments = Self::assignment_facts(&mut *tx, Some(protocol_id)).await?;
        let events = Self::event_facts(&mut *tx, Some(protocol_id)).await?;
        tx.commit().await?;

        Ok(protocol_metrics(
            protocol_id,
            &step_orders,
            &assignments,
            &events,
        ))
    }

    /// Every patient with their overall adherence rate.
    pub async fn patient_adherence(pool: &PgPool) -> Result<Vec<PatientAdherence>, DbError> {
        let mut tx = Self::snapshot(pool).await?;

        let query = format!(
            "SELECT {} FROM patients ORDER BY display_name, id",
            patient_repo::COLUMNS
        );
        let patients = sqlx::query_as::<_, Patient>(&query)
            .fetch_all(&mut *tx)
            .await?;
        let assignments = Self::assignment_facts(&mut *tx, None).await?;
        tx.commit().await?;

        let mut by_patient: HashMap<DbId, Vec<AssignmentFact>> = HashMap::new();
        for fact in assignments {
            by_patient.entry(fact.patient_id).or_default().push(fact);
        }

        Ok(patients
            .into_iter()
            .map(|patient| {
                let facts = by_patient.remove(&patient.id).unwrap_or_default();
                PatientAdherence {
                    assignment_count: facts.len() as i64,
                    overall_adherence_rate: patient_adherence_rate(&facts),
                    patient,
                }
            })
            .collect())
    }

    /// One row per step event joined with its assignment, patient and
    /// protocol, in the order the events occurred.
    pub async fn export(
        pool: &PgPool,
        protocol_id: Option<DbId>,
    ) -> Result<Vec<ExportRow>, DbError> {
        let mut tx = Self::snapshot(pool).await?;
        let records = sqlx::query_as::<_, ExportRecord>(
            "SELECT \
                e.id AS event_id, e.assignment_id, a.status AS assignment_status, \
                p.id AS patient_id, p.display_name AS patient_name, p.hospital_number, \
                pr.id AS protocol_id, pr.name AS protocol_name, \
                e.step_index, e.kind AS event_kind, e.occurred_at, e.value \
             FROM step_events e \
             JOIN protocol_assignments a ON a.id = e.assignment_id \
             JOIN patients p ON p.id = a.patient_id \
             JOIN protocols pr ON pr.id = a.protocol_id \
             WHERE ($1::BIGINT IS NULL OR a.protocol_id = $1) \
             ORDER BY e.occurred_at, e.id",
        )
        .bind(protocol_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(records.into_iter().map(ExportRow::from).collect())
    }

    async fn snapshot(pool: &PgPool) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn assignment_facts(
        conn: &mut PgConnection,
        protocol_id: Option<DbId>,
    ) -> Result<Vec<AssignmentFact>, DbError> {
        let query = format!(
            "SELECT {FACT_COLUMNS} FROM protocol_assignments a \
             WHERE ($1::BIGINT IS NULL OR a.protocol_id = $1)"
        );
        let rows = sqlx::query_as::<_, AssignmentFactRow>(&query)
            .bind(protocol_id)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(AssignmentFactRow::fact)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn event_facts(
        conn: &mut PgConnection,
        protocol_id: Option<DbId>,
    ) -> Result<Vec<EventFact>, DbError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM step_events e \
             JOIN protocol_assignments a ON a.id = e.assignment_id \
             WHERE ($1::BIGINT IS NULL OR a.protocol_id = $1)"
        );
        let rows = sqlx::query_as::<_, StepEvent>(&query)
            .bind(protocol_id)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(StepEvent::fact)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
