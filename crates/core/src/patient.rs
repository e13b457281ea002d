use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Directory status of a patient. Inactive patients cannot be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Inactive,
}

impl PatientStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(CoreError::validation(format!(
                "Invalid patient status '{s}'. Must be one of: active, inactive"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// Validate a new patient's display name.
pub fn validate_display_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("patient display name is required"));
    }
    if trimmed.chars().count() > 200 {
        return Err(CoreError::validation(
            "patient display name must be at most 200 characters",
        ));
    }
    Ok(())
}
