//! PostgreSQL document store for coursegen: course, plan, user and lease
//! records plus the embedded schema migrations.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
