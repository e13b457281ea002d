//! Repository for the `patients` table.

use careflow_core::patient::PatientStatus;
use careflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::patient::{CreatePatient, Patient, PatientListQuery};

/// Column list for `patients` queries.
pub(crate) const COLUMNS: &str = "id, display_name, real_name, hospital_number, status, created_at, updated_at";

/// Provides CRUD operations for the patient directory.
pub struct PatientRepo;

impl PatientRepo {
    /// Insert a new active patient.
    pub async fn create(pool: &PgPool, input: &CreatePatient) -> Result<Patient, sqlx::Error> {
        let query = format!(
            "INSERT INTO patients (display_name, real_name, hospital_number) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(input.display_name.trim())
            .bind(input.real_name.as_deref())
            .bind(input.hospital_number.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Find a patient by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM patients WHERE id = $1");
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List patients by display name with optional filters.
    pub async fn list(
        pool: &PgPool,
        params: &PatientListQuery,
    ) -> Result<Vec<Patient>, sqlx::Error> {
        let (limit, offset) = super::page(params.limit, params.offset);

        let mut conditions = Vec::new();
        let mut bind_idx = 1u32;

        if params.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.search.is_some() {
            conditions.push(format!(
                "(display_name ILIKE ${bind_idx} OR real_name ILIKE ${bind_idx} \
                  OR hospital_number ILIKE ${bind_idx})"
            ));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM patients {where_clause} \
             ORDER BY display_name, id \
             LIMIT ${bind_idx} OFFSET ${next_idx}",
            next_idx = bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Patient>(&query);
        if let Some(ref status) = params.status {
            q = q.bind(status);
        }
        if let Some(ref search) = params.search {
            q = q.bind(format!("%{search}%"));
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Activate or deactivate a patient. Returns `None` if the row is missing.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: PatientStatus,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let query = format!(
            "UPDATE patients SET status = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Patient>(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(pool)
            .await
    }
}
