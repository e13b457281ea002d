//! Repository for the `protocols` table.

use careflow_core::error::CoreError;
use careflow_core::protocol::ProtocolDefinition;
use careflow_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::error::DbError;
use crate::models::protocol::{
    CreateProtocol, Protocol, ProtocolListQuery, ProtocolWithSteps, UpdateProtocol,
};
use crate::repositories::ProtocolStepRepo;

/// Column list for `protocols` queries.
const COLUMNS: &str = "id, name, description, status, created_by, created_at, updated_at";

/// Provides CRUD and lifecycle operations for protocol definitions.
pub struct ProtocolRepo;

impl ProtocolRepo {
    /// Insert a new draft protocol.
    pub async fn create(
        pool: &PgPool,
        input: &CreateProtocol,
        created_by: Option<&str>,
    ) -> Result<Protocol, sqlx::Error> {
        let query = format!(
            "INSERT INTO protocols (name, description, created_by) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Protocol>(&query)
            .bind(input.name.trim())
            .bind(input.description.as_deref())
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Find a protocol by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Protocol>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM protocols WHERE id = $1");
        sqlx::query_as::<_, Protocol>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List protocols, newest first, with optional filters.
    pub async fn list(
        pool: &PgPool,
        params: &ProtocolListQuery,
    ) -> Result<Vec<Protocol>, sqlx::Error> {
        let (limit, offset) = super::page(params.limit, params.offset);

        let mut conditions = Vec::new();
        let mut bind_idx = 1u32;

        if params.status.is_some() {
            conditions.push(format!("status = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.created_by.is_some() {
            conditions.push(format!("created_by = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.search.is_some() {
            conditions.push(format!(
                "(name ILIKE ${bind_idx} OR description ILIKE ${bind_idx})"
            ));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM protocols {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ${bind_idx} OFFSET ${next_idx}",
            next_idx = bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Protocol>(&query);
        if let Some(ref status) = params.status {
            q = q.bind(status);
        }
        if let Some(ref created_by) = params.created_by {
            q = q.bind(created_by);
        }
        if let Some(ref search) = params.search {
            q = q.bind(format!("%{search}%"));
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Update name and/or description. Returns `None` if the row is missing.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateProtocol,
    ) -> Result<Option<Protocol>, sqlx::Error> {
        let query = format!(
            "UPDATE protocols SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Protocol>(&query)
            .bind(id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(input.description.as_deref())
            .fetch_optional(pool)
            .await
    }

    /// Delete a protocol. Steps, assignments and their events cascade.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM protocols WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// A protocol and its ordered step rows.
    pub async fn find_with_steps(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProtocolWithSteps>, sqlx::Error> {
        let Some(protocol) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let steps = ProtocolStepRepo::list_for_protocol(pool, id).await?;
        Ok(Some(ProtocolWithSteps { protocol, steps }))
    }

    /// Load the domain definition without locking.
    pub async fn load_definition(
        pool: &PgPool,
        id: DbId,
    ) -> Result<ProtocolDefinition, DbError> {
        let protocol = Self::find_by_id(pool, id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Protocol",
                id,
            })?;
        let steps = ProtocolStepRepo::list_for_protocol(pool, id).await?;
        Ok(protocol.definition(&steps)?)
    }

    /// Lock the protocol row for the rest of the transaction and load its
    /// definition.
    pub(crate) async fn lock_definition(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<ProtocolDefinition, DbError> {
        let query = format!("SELECT {COLUMNS} FROM protocols WHERE id = $1 FOR UPDATE");
        let protocol = sqlx::query_as::<_, Protocol>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Protocol",
                id,
            })?;
        let steps = ProtocolStepRepo::list_for_protocol(&mut *conn, id).await?;
        Ok(protocol.definition(&steps)?)
    }

    /// Apply a lifecycle transition under a row lock and persist the new
    /// status.
    pub async fn transition<F>(pool: &PgPool, id: DbId, apply: F) -> Result<Protocol, DbError>
    where
        F: FnOnce(&mut ProtocolDefinition) -> Result<(), CoreError> + Send,
    {
        let mut tx = pool.begin().await?;
        let mut definition = Self::lock_definition(&mut *tx, id).await?;
        let from = definition.status;
        apply(&mut definition)?;

        let query = format!(
            "UPDATE protocols SET status = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let protocol = sqlx::query_as::<_, Protocol>(&query)
            .bind(id)
            .bind(definition.status.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            protocol_id = id,
            from = from.as_str(),
            to = definition.status.as_str(),
            "Protocol status changed"
        );
        Ok(protocol)
    }
}
