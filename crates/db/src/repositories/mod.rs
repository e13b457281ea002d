//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Operations that apply domain
//! rules run inside one transaction and return [`crate::DbError`].

pub mod assignment_repo;
pub mod patient_repo;
pub mod protocol_repo;
pub mod protocol_step_repo;
pub mod research_repo;
pub mod step_event_repo;

pub use assignment_repo::AssignmentRepo;
pub use patient_repo::PatientRepo;
pub use protocol_repo::ProtocolRepo;
pub use protocol_step_repo::ProtocolStepRepo;
pub use research_repo::ResearchRepo;
pub use step_event_repo::StepEventRepo;

/// Default page size for list endpoints.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for list endpoints.
const MAX_LIMIT: i64 = 200;

/// Resolve `limit`/`offset` query parameters to bounded values.
fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset.unwrap_or(0).max(0),
    )
}
