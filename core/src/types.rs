//! Domain DTOs for the platform API.
//!
//! # Design
//! Only the shapes the client itself interprets are typed: token responses
//! and the user profile consulted at login. View and record payloads are
//! user-defined tables, so endpoint methods return them as raw
//! `serde_json::Value`. Unknown fields are kept in `extra` rather than
//! dropped so callers still see the whole server response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Successful response from the OAuth2 token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires, relative to issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// An account the authenticated user belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The current user's profile as returned by `/openapi/users/me`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Authenticated session produced by `TrackviaClient::login`.
///
/// The active account is always the first account listed in the profile;
/// the client offers no way to pick another one.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserProfile,
    pub account_id: i64,
}
