//! Row structs and DTOs for the alerts table.

pub mod alert;
