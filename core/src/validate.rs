//! Response classification.
//!
//! The platform reports failures inside 200-level JSON bodies of the form
//! `{"error_description": "..."}`, so the HTTP status says nothing about
//! whether a call worked. Expiry is detected by comparing the description
//! against the server's exact wording; if the upstream text changes, expired
//! tokens will surface as `ApiError::Api` instead of being refreshed.

use serde_json::Value;

use crate::error::ApiError;

/// The server's `error_description` for an expired access token.
pub const EXPIRED_ACCESS_TOKEN: &str = "The access token provided has expired";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    /// The access token expired; the call may be replayed with a new token.
    Expired,
}

/// Classify a decoded response body.
///
/// Anything that is not an object carrying a non-null `error_description`
/// is `Ok`.
pub fn classify(response: &Value) -> Result<Verdict, ApiError> {
    let Some(description) = response
        .get("error_description")
        .filter(|description| !description.is_null())
    else {
        return Ok(Verdict::Ok);
    };
    let message = match description {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if message == EXPIRED_ACCESS_TOKEN {
        return Ok(Verdict::Expired);
    }
    Err(ApiError::Api(message))
}
