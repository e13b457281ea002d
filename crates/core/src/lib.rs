//! Careflow domain core.
//!
//! Pure protocol scheduling and assignment logic with no I/O. The `db` and
//! `api` crates persist and expose what lives here.

pub mod adherence;
pub mod assignment;
pub mod error;
pub mod export;
pub mod patient;
pub mod protocol;
pub mod step;
pub mod trigger;
pub mod types;
