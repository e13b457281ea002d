//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for inserts, updates and list filters

pub mod assignment;
pub mod patient;
pub mod protocol;
pub mod protocol_step;
pub mod research;
pub mod step_event;
