#![allow(dead_code)]

use careflow_core::protocol::ProtocolDefinition;
use careflow_core::step::StepSpec;
use careflow_db::models::patient::{CreatePatient, Patient};
use careflow_db::models::protocol::{CreateProtocol, Protocol};
use careflow_db::repositories::{PatientRepo, ProtocolRepo, ProtocolStepRepo};
use chrono::FixedOffset;
use serde_json::json;
use sqlx::PgPool;

pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

pub fn text_step(trigger_type: &str, trigger_value: &str, text: &str) -> StepSpec {
    serde_json::from_value(json!({
        "trigger_type": trigger_type,
        "trigger_value": trigger_value,
        "message_type": "text",
        "content_payload": { "text": text },
    }))
    .unwrap()
}

pub fn action_step(trigger_type: &str, trigger_value: &str, text: &str) -> StepSpec {
    serde_json::from_value(json!({
        "trigger_type": trigger_type,
        "trigger_value": trigger_value,
        "message_type": "text",
        "content_payload": { "text": text },
        "requires_action": true,
        "feedback_config": {
            "question": "Did you take it?",
            "buttons": [
                { "label": "Yes", "value": "yes", "action": "complete" },
                { "label": "Later", "value": "later", "action": "postpone" },
                { "label": "Skip", "value": "skip", "action": "skip" }
            ]
        }
    }))
    .unwrap()
}

pub async fn patient(pool: &PgPool, name: &str) -> Patient {
    PatientRepo::create(
        pool,
        &CreatePatient {
            display_name: name.to_string(),
            real_name: None,
            hospital_number: None,
        },
    )
    .await
    .unwrap()
}

pub async fn draft_protocol(pool: &PgPool, name: &str, steps: Vec<StepSpec>) -> Protocol {
    let protocol = ProtocolRepo::create(
        pool,
        &CreateProtocol {
            name: name.to_string(),
            description: None,
        },
        Some("nurse-1"),
    )
    .await
    .unwrap();
    ProtocolStepRepo::edit(pool, protocol.id, |def| {
        def.replace_steps(steps);
        Ok(())
    })
    .await
    .unwrap();
    protocol
}

pub async fn active_protocol(pool: &PgPool, name: &str, steps: Vec<StepSpec>) -> Protocol {
    let protocol = draft_protocol(pool, name, steps).await;
    ProtocolRepo::transition(pool, protocol.id, ProtocolDefinition::activate)
        .await
        .unwrap()
}

/// "Daily Meds": immediate reminder, then a 60 minute delayed check-in.
pub async fn daily_meds(pool: &PgPool) -> Protocol {
    active_protocol(
        pool,
        "Daily Meds",
        vec![
            text_step("immediate", "", "Time for your morning pills"),
            action_step("delay", "60", "Did you take your pills?"),
        ],
    )
    .await
}
