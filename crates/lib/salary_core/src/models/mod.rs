//! Domain models.

pub mod auth;
pub mod workplace;
