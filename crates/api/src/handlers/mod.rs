pub mod assignment;
pub mod patient;
pub mod protocol;
pub mod protocol_step;
pub mod research;
