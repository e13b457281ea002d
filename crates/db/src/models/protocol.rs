//! Protocol entity model and DTOs.

use careflow_core::error::CoreError;
use careflow_core::protocol::{ProtocolDefinition, ProtocolStatus};
use careflow_core::step::ProtocolStep;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::protocol_step::ProtocolStepRow;

/// A row from the `protocols` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Protocol {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Protocol {
    pub fn status(&self) -> Result<ProtocolStatus, CoreError> {
        ProtocolStatus::from_str_db(&self.status)
    }

    /// Assemble the domain definition from this row and its step rows.
    pub fn definition(&self, steps: &[ProtocolStepRow]) -> Result<ProtocolDefinition, CoreError> {
        let steps = steps
            .iter()
            .map(ProtocolStepRow::to_step)
            .collect::<Result<Vec<ProtocolStep>, _>>()?;
        Ok(ProtocolDefinition {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status()?,
            steps,
        })
    }
}

/// A protocol together with its ordered steps.
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolWithSteps {
    #[serde(flatten)]
    pub protocol: Protocol,
    pub steps: Vec<ProtocolStepRow>,
}

/// DTO for creating a new protocol. Protocols always start as drafts.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProtocol {
    pub name: String,
    pub description: Option<String>,
}

/// DTO for updating a protocol's descriptive fields.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProtocol {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Query parameters for `GET /api/v1/protocols`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolListQuery {
    pub status: Option<String>,
    pub created_by: Option<String>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Outcome of `GET /api/v1/protocols/{id}/validate`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_violations(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
