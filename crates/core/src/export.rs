//! Research export of the step event log.

use serde::Serialize;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Output format of a research export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Parse the `format` parameter; absent means JSON.
    pub fn parse(value: Option<&str>) -> Result<Self, CoreError> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None | Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            Some(other) => Err(CoreError::validation(format!(
                "Invalid export format '{other}'. Must be one of: csv, json"
            ))),
        }
    }
}

/// One step event joined with its assignment, patient and protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub event_id: DbId,
    pub assignment_id: DbId,
    pub assignment_status: String,
    pub patient_id: DbId,
    pub patient_name: String,
    pub hospital_number: Option<String>,
    pub protocol_id: DbId,
    pub protocol_name: String,
    pub step_index: i32,
    pub event_kind: String,
    pub occurred_at: Timestamp,
    pub value: Option<String>,
}

const CSV_HEADER: &str = "event_id,assignment_id,assignment_status,patient_id,patient_name,\
hospital_number,protocol_id,protocol_name,step_index,event_kind,occurred_at,value";

/// Render rows as RFC 4180 CSV with a header line and CRLF line endings.
pub fn rows_to_csv(rows: &[ExportRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push_str("\r\n");
    for row in rows {
        let fields = [
            row.event_id.to_string(),
            row.assignment_id.to_string(),
            csv_escape(&row.assignment_status),
            row.patient_id.to_string(),
            csv_escape(&row.patient_name),
            csv_escape(row.hospital_number.as_deref().unwrap_or_default()),
            row.protocol_id.to_string(),
            csv_escape(&row.protocol_name),
            row.step_index.to_string(),
            csv_escape(&row.event_kind),
            row.occurred_at.to_rfc3339(),
            csv_escape(row.value.as_deref().unwrap_or_default()),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

/// Quote a field if it contains a comma, quote or line break.
fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn row(value: Option<&str>) -> ExportRow {
        ExportRow {
            event_id: 7,
            assignment_id: 3,
            assignment_status: "active".into(),
            patient_id: 12,
            patient_name: "Somchai, J.".into(),
            hospital_number: None,
            protocol_id: 1,
            protocol_name: "Daily Meds".into(),
            step_index: 2,
            event_kind: "responded".into(),
            occurred_at: Utc.with_ymd_and_hms(2026, 4, 2, 9, 5, 0).unwrap(),
            value: value.map(String::from),
        }
    }

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(ExportFormat::parse(None).unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::parse(Some("CSV")).unwrap(), ExportFormat::Csv);
        assert_matches!(ExportFormat::parse(Some("xlsx")), Err(CoreError::Validation(_)));
    }

    #[test]
    fn csv_quotes_special_characters() {
        let csv = rows_to_csv(&[row(Some("said \"yes\"\nthen left"))]);
        let mut lines = csv.split("\r\n");
        assert!(lines.next().unwrap().starts_with("event_id,assignment_id"));
        let body = lines.next().unwrap();
        assert!(body.starts_with("7,3,active,12,\"Somchai, J.\",,1,Daily Meds,2,responded,"));
        assert!(body.contains("2026-04-02T09:05:00+00:00"));
        assert!(body.ends_with("\"said \"\"yes\"\"\nthen left\""));
    }

    #[test]
    fn empty_export_is_header_only() {
        assert_eq!(rows_to_csv(&[]), format!("{CSV_HEADER}\r\n"));
    }
}
