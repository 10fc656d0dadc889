//! # salary_core
//!
//! Core authentication and authorization logic for the salary service,
//! plus the attendance, salary and public item records it guards.

pub mod auth;
pub mod mail;
pub mod migrate;
pub mod models;
pub mod store;
pub mod workplace;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
