//! Request handlers.

pub mod auth;
pub mod boss;
pub mod employee;
pub mod health;

use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Decode a JSON body that may be absent. An empty body yields `T::default()`.
pub(crate) fn optional_json<T>(body: &[u8]) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))
}
