//! Query functions, one module per table.

pub mod courses;
pub mod leases;
pub mod plans;
pub mod users;
