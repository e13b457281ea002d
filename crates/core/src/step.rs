//! Protocol step model: message content variants and feedback buttons.
//!
//! A step is persisted with its trigger and content payload in their raw
//! stored form so that a draft may hold an incomplete step. Typed views
//! ([`Trigger`], [`ContentPayload`]) are produced on demand and every
//! structural problem is reported by [`StepSpec::violations`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::trigger::{Trigger, TriggerType};

/// Maximum number of response buttons on a single step.
pub const MAX_FEEDBACK_BUTTONS: usize = 5;

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

/// Kind of message delivered by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    Link,
    Flex,
}

impl MessageType {
    /// Content payload keys this message type accepts.
    pub fn payload_keys(self) -> &'static [&'static str] {
        match self {
            Self::Text => &["text"],
            Self::Image => &["imageUrl", "text"],
            Self::Link => &["linkUrl", "linkText"],
            Self::Flex => &["flexMessage"],
        }
    }

    /// Parse a message type string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "link" => Ok(Self::Link),
            "flex" => Ok(Self::Flex),
            _ => Err(CoreError::validation(format!(
                "Invalid message type '{s}'. Must be one of: text, image, link, flex"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Link => "link",
            Self::Flex => "flex",
        }
    }
}

// ---------------------------------------------------------------------------
// Content payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ImageContent {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LinkContent {
    pub link_url: String,
    pub link_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FlexContent {
    pub flex_message: serde_json::Value,
}

/// Typed message content, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPayload {
    Text(TextContent),
    Image(ImageContent),
    Link(LinkContent),
    Flex(FlexContent),
}

impl ContentPayload {
    /// Build the typed payload for `message_type` from its stored JSON.
    ///
    /// Keys whose value is `null` are treated as absent. Fields that belong
    /// to a different message type are rejected, as are blank required
    /// strings.
    pub fn from_json(message_type: MessageType, raw: &serde_json::Value) -> Result<Self, String> {
        let cleaned = match raw {
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            _ => return Err("content payload must be a JSON object".to_string()),
        };

        let label = message_type.as_str();
        let payload = match message_type {
            MessageType::Text => serde_json::from_value(cleaned).map(Self::Text),
            MessageType::Image => serde_json::from_value(cleaned).map(Self::Image),
            MessageType::Link => serde_json::from_value(cleaned).map(Self::Link),
            MessageType::Flex => serde_json::from_value(cleaned).map(Self::Flex),
        }
        .map_err(|e| format!("{label} content is invalid: {e}"))?;

        payload.check_required()?;
        Ok(payload)
    }

    /// The message type this payload belongs to.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text(_) => MessageType::Text,
            Self::Image(_) => MessageType::Image,
            Self::Link(_) => MessageType::Link,
            Self::Flex(_) => MessageType::Flex,
        }
    }

    /// Serialize back to the stored JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        let result = match self {
            Self::Text(c) => serde_json::to_value(c),
            Self::Image(c) => serde_json::to_value(c),
            Self::Link(c) => serde_json::to_value(c),
            Self::Flex(c) => serde_json::to_value(c),
        };
        result.unwrap_or(serde_json::Value::Null)
    }

    fn check_required(&self) -> Result<(), String> {
        let label = self.message_type().as_str();
        let blank = |field: &str| Err(format!("{label} content requires a non-empty `{field}`"));
        match self {
            Self::Text(c) if c.text.trim().is_empty() => blank("text"),
            Self::Image(c) if c.image_url.trim().is_empty() => blank("imageUrl"),
            Self::Link(c) if c.link_url.trim().is_empty() => blank("linkUrl"),
            Self::Link(c) if c.link_text.trim().is_empty() => blank("linkText"),
            Self::Flex(c) if !c.flex_message.is_object() => {
                Err("flex content requires `flexMessage` to be a JSON object".to_string())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// What a response button does to the patient's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    /// The step is done; advance and count it as completed.
    Complete,
    /// Record the response but keep the step current.
    Postpone,
    /// Advance without counting the step as completed.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackButton {
    pub label: String,
    pub value: String,
    pub action: ButtonAction,
}

/// Prompt plus response buttons shown on action-requiring steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub question: String,
    pub buttons: Vec<FeedbackButton>,
}

impl FeedbackConfig {
    /// Structural problems with this configuration, without a step prefix.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.question.trim().is_empty() {
            out.push("feedback question is required".to_string());
        }
        if self.buttons.is_empty() || self.buttons.len() > MAX_FEEDBACK_BUTTONS {
            out.push(format!(
                "feedback must have between 1 and {MAX_FEEDBACK_BUTTONS} buttons (found {})",
                self.buttons.len()
            ));
        }
        let mut seen = HashSet::new();
        for (i, button) in self.buttons.iter().enumerate() {
            let n = i + 1;
            if button.label.trim().is_empty() {
                out.push(format!("feedback button {n} has an empty label"));
            }
            if button.value.trim().is_empty() {
                out.push(format!("feedback button {n} has an empty value"));
            } else if !seen.insert(button.value.as_str()) {
                out.push(format!(
                    "feedback button value '{}' is used more than once",
                    button.value
                ));
            }
        }
        out
    }

    /// Find the button whose value matches a response.
    pub fn button_for(&self, value: &str) -> Option<&FeedbackButton> {
        self.buttons.iter().find(|b| b.value == value)
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// The editable body of a protocol step (everything except its order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_value: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub content_payload: serde_json::Value,
    #[serde(default)]
    pub requires_action: bool,
    #[serde(default)]
    pub feedback_config: Option<FeedbackConfig>,
}

impl StepSpec {
    /// Parse this step's trigger.
    pub fn trigger(&self) -> Result<Trigger, CoreError> {
        Trigger::parse(self.trigger_type, &self.trigger_value)
    }

    /// Parse this step's content payload.
    pub fn content(&self) -> Result<ContentPayload, CoreError> {
        ContentPayload::from_json(self.message_type, &self.content_payload)
            .map_err(CoreError::validation)
    }

    /// Every rule this step breaks, prefixed with `step {order}`.
    pub fn violations(&self, order: i32) -> Vec<String> {
        let mut out = Vec::new();
        let prefix = format!("step {order}");

        if let Err(e) = self.trigger() {
            let detail = match e {
                CoreError::InvalidTrigger(msg) => msg,
                other => other.to_string(),
            };
            out.push(format!("{prefix}: {detail}"));
        }

        match (self.requires_action, &self.feedback_config) {
            (true, None) => out.push(format!(
                "{prefix}: requires action but has no feedback configuration"
            )),
            (false, Some(_)) => out.push(format!(
                "{prefix}: feedback configuration is only allowed on steps that require action"
            )),
            (true, Some(feedback)) => {
                out.extend(feedback.violations().into_iter().map(|v| format!("{prefix}: {v}")));
            }
            (false, None) => {}
        }

        if let Err(e) = ContentPayload::from_json(self.message_type, &self.content_payload) {
            out.push(format!("{prefix}: {e}"));
        }

        out
    }

    /// Problems that are rejected even while the step is a draft: a payload
    /// that is not an object, or keys belonging to another message type.
    /// Missing or blank fields are left to [`StepSpec::violations`].
    pub fn draft_violations(&self, order: i32) -> Vec<String> {
        let map = match &self.content_payload {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Vec::new(),
            _ => return vec![format!("step {order}: content payload must be a JSON object")],
        };
        let allowed = self.message_type.payload_keys();
        map.iter()
            .filter(|(key, value)| !value.is_null() && !allowed.contains(&key.as_str()))
            .map(|(key, _)| {
                format!(
                    "step {order}: `{key}` is not a {} content field",
                    self.message_type.as_str()
                )
            })
            .collect()
    }

    /// Resolve a patient response against this step's buttons.
    ///
    /// Steps with buttons only accept one of their button values. Steps
    /// without buttons accept any free text and treat it as completion.
    pub fn resolve_response(&self, value: Option<&str>) -> Result<ButtonAction, CoreError> {
        let Some(feedback) = self.feedback_config.as_ref().filter(|f| !f.buttons.is_empty())
        else {
            return Ok(ButtonAction::Complete);
        };

        let value = value.ok_or_else(|| {
            CoreError::validation("a response value is required for steps with response buttons")
        })?;

        feedback
            .button_for(value)
            .map(|b| b.action)
            .ok_or_else(|| {
                let allowed: Vec<&str> = feedback.buttons.iter().map(|b| b.value.as_str()).collect();
                CoreError::validation(format!(
                    "response '{value}' does not match any button (expected one of: {})",
                    allowed.join(", ")
                ))
            })
    }
}

/// A step at a fixed position in its protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub step_order: i32,
    #[serde(flatten)]
    pub spec: StepSpec,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn text_step(trigger_type: TriggerType, value: &str) -> StepSpec {
        StepSpec {
            trigger_type,
            trigger_value: value.to_string(),
            message_type: MessageType::Text,
            content_payload: serde_json::json!({ "text": "Take your medication" }),
            requires_action: false,
            feedback_config: None,
        }
    }

    pub fn yes_no_feedback() -> FeedbackConfig {
        FeedbackConfig {
            question: "Did you take it?".to_string(),
            buttons: vec![
                FeedbackButton {
                    label: "Yes".to_string(),
                    value: "yes".to_string(),
                    action: ButtonAction::Complete,
                },
                FeedbackButton {
                    label: "Later".to_string(),
                    value: "later".to_string(),
                    action: ButtonAction::Postpone,
                },
                FeedbackButton {
                    label: "Skip today".to_string(),
                    value: "skip".to_string(),
                    action: ButtonAction::Skip,
                },
            ],
        }
    }

    pub fn action_step(trigger_type: TriggerType, value: &str) -> StepSpec {
        StepSpec {
            requires_action: true,
            feedback_config: Some(yes_no_feedback()),
            ..text_step(trigger_type, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::fixtures::*;
    use super::*;

    #[test]
    fn valid_text_step_has_no_violations() {
        assert!(text_step(TriggerType::Immediate, "").violations(1).is_empty());
    }

    #[test]
    fn image_without_url_is_reported() {
        let step = StepSpec {
            message_type: MessageType::Image,
            content_payload: json!({ "text": "caption only" }),
            ..text_step(TriggerType::Immediate, "")
        };
        let v = step.violations(3);
        assert_eq!(v.len(), 1);
        assert!(v[0].starts_with("step 3: image content is invalid"));
        assert!(v[0].contains("imageUrl"));
    }

    #[test]
    fn unrelated_content_fields_are_rejected() {
        let err = ContentPayload::from_json(
            MessageType::Text,
            &json!({ "text": "hi", "linkUrl": "https://example.org" }),
        )
        .unwrap_err();
        assert!(err.contains("linkUrl"));
    }

    #[test]
    fn null_fields_are_treated_as_absent() {
        let payload = ContentPayload::from_json(
            MessageType::Image,
            &json!({ "imageUrl": "https://cdn/pill.png", "text": null, "linkUrl": null }),
        )
        .unwrap();
        assert_eq!(payload.message_type(), MessageType::Image);
        assert_eq!(payload.to_json(), json!({ "imageUrl": "https://cdn/pill.png" }));
    }

    #[test]
    fn link_requires_both_fields() {
        let err = ContentPayload::from_json(MessageType::Link, &json!({ "linkUrl": "https://x" }))
            .unwrap_err();
        assert!(err.contains("linkText"));

        let err = ContentPayload::from_json(
            MessageType::Link,
            &json!({ "linkUrl": "https://x", "linkText": "  " }),
        )
        .unwrap_err();
        assert!(err.contains("linkText"));
    }

    #[test]
    fn flex_requires_object_document() {
        let bubble = json!({ "flexMessage": { "type": "bubble" } });
        assert!(ContentPayload::from_json(MessageType::Flex, &bubble).is_ok());

        let bare = json!({ "flexMessage": "bubble" });
        assert!(ContentPayload::from_json(MessageType::Flex, &bare).is_err());
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = ContentPayload::from_json(MessageType::Text, &json!({ "text": "" })).unwrap_err();
        assert!(err.contains("non-empty `text`"));
    }

    #[test]
    fn requires_action_without_feedback_is_reported() {
        let step = StepSpec {
            requires_action: true,
            ..text_step(TriggerType::Delay, "60")
        };
        let v = step.violations(2);
        assert_eq!(v, vec!["step 2: requires action but has no feedback configuration"]);
    }

    #[test]
    fn feedback_without_requires_action_is_reported() {
        let step = StepSpec {
            feedback_config: Some(yes_no_feedback()),
            ..text_step(TriggerType::Immediate, "")
        };
        assert_eq!(step.violations(1).len(), 1);
    }

    #[test]
    fn feedback_button_rules() {
        let mut feedback = yes_no_feedback();
        feedback.question = " ".into();
        feedback.buttons[1].value = "yes".into();
        feedback.buttons[2].label = String::new();
        let v = feedback.violations();
        assert_eq!(v.len(), 3, "{v:?}");

        let too_many = FeedbackConfig {
            question: "?".into(),
            buttons: (0..6)
                .map(|i| FeedbackButton {
                    label: format!("b{i}"),
                    value: format!("v{i}"),
                    action: ButtonAction::Complete,
                })
                .collect(),
        };
        assert_eq!(too_many.violations().len(), 1);
    }

    #[test]
    fn malformed_trigger_is_reported_with_step_prefix() {
        let v = text_step(TriggerType::Scheduled, "9am").violations(4);
        assert_eq!(v.len(), 1);
        assert!(v[0].starts_with("step 4: scheduled value '9am'"));
    }

    #[test]
    fn draft_rejects_fields_of_another_message_type() {
        let step = StepSpec {
            content_payload: json!({ "text": "hi", "linkUrl": "https://example.org", "imageUrl": null }),
            ..text_step(TriggerType::Immediate, "")
        };
        assert_eq!(
            step.draft_violations(2),
            vec!["step 2: `linkUrl` is not a text content field".to_string()]
        );

        let incomplete = StepSpec {
            message_type: MessageType::Link,
            content_payload: json!({ "linkText": "" }),
            ..text_step(TriggerType::Immediate, "")
        };
        assert!(incomplete.draft_violations(1).is_empty());
        assert!(!incomplete.violations(1).is_empty());

        let not_object = StepSpec {
            content_payload: json!("hello"),
            ..text_step(TriggerType::Immediate, "")
        };
        assert_eq!(not_object.draft_violations(1).len(), 1);
    }

    #[test]
    fn resolve_response_matches_buttons() {
        let step = action_step(TriggerType::Immediate, "");
        assert_eq!(step.resolve_response(Some("yes")).unwrap(), ButtonAction::Complete);
        assert_eq!(step.resolve_response(Some("later")).unwrap(), ButtonAction::Postpone);
        assert_eq!(step.resolve_response(Some("skip")).unwrap(), ButtonAction::Skip);
        assert_matches!(step.resolve_response(Some("maybe")), Err(CoreError::Validation(_)));
        assert_matches!(step.resolve_response(None), Err(CoreError::Validation(_)));
    }

    #[test]
    fn resolve_response_accepts_free_text_without_buttons() {
        let step = text_step(TriggerType::Immediate, "");
        assert_eq!(
            step.resolve_response(Some("feeling fine")).unwrap(),
            ButtonAction::Complete
        );
        assert_eq!(step.resolve_response(None).unwrap(), ButtonAction::Complete);
    }

    #[test]
    fn step_json_is_flat() {
        let step = ProtocolStep {
            step_order: 2,
            spec: text_step(TriggerType::Delay, "60"),
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["step_order"], 2);
        assert_eq!(value["trigger_type"], "delay");
        assert_eq!(value["message_type"], "text");
    }
}
