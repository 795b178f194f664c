//! Request and response bodies

pub mod advance;

use axum::{extract::rejection::JsonRejection, Json};
use validator::Validate;

use crate::error::ApiError;

/// Unwraps a JSON body and runs its `validator` rules
///
/// Malformed JSON and failed rules both become `400 Bad Request`.
pub fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    Ok(body)
}
