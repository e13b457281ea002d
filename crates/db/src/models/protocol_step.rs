//! Protocol step row and request DTOs.

use careflow_core::error::CoreError;
use careflow_core::protocol::MoveDirection;
use careflow_core::step::{FeedbackConfig, MessageType, ProtocolStep, StepSpec};
use careflow_core::trigger::TriggerType;
use careflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `protocol_steps` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProtocolStepRow {
    pub id: DbId,
    pub protocol_id: DbId,
    pub step_order: i32,
    pub trigger_type: String,
    pub trigger_value: String,
    pub message_type: String,
    pub content_payload: serde_json::Value,
    pub requires_action: bool,
    pub feedback_config: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProtocolStepRow {
    /// Convert to the domain step. Stored rows were written from a
    /// [`StepSpec`], so a decode failure means the row was edited out of band.
    pub fn to_step(&self) -> Result<ProtocolStep, CoreError> {
        let feedback_config = self
            .feedback_config
            .clone()
            .map(serde_json::from_value::<FeedbackConfig>)
            .transpose()
            .map_err(|e| {
                CoreError::Internal(format!(
                    "protocol step {} has unreadable feedback config: {e}",
                    self.id
                ))
            })?;

        Ok(ProtocolStep {
            step_order: self.step_order,
            spec: StepSpec {
                trigger_type: TriggerType::from_str_db(&self.trigger_type)?,
                trigger_value: self.trigger_value.clone(),
                message_type: MessageType::from_str_db(&self.message_type)?,
                content_payload: self.content_payload.clone(),
                requires_action: self.requires_action,
                feedback_config,
            },
        })
    }
}

/// Body of `PUT /api/v1/protocols/{id}/steps`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceSteps {
    pub steps: Vec<StepSpec>,
}

/// Body of `POST /api/v1/protocols/{id}/steps/{order}/move`.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveStep {
    pub direction: MoveDirection,
}
