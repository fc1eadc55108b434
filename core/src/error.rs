//! Error types for the platform client.
//!
//! # Design
//! The server reports application failures inside successful responses, so
//! `Api` carries the server's `error_description` verbatim. Token expiry is
//! not an error here: the dispatcher recovers from it internally and only
//! surfaces it as `Api` when a replay also comes back expired.
//! Transport failures keep their own type so callers can tell "the network
//! broke" apart from "the server said no."

use thiserror::Error;

/// Errors returned by the dispatcher, token providers and endpoint methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `authenticate()` returned but the token provider holds no token.
    #[error("cannot make an api request without an access token")]
    MissingToken,

    /// The server answered with an `error_description` envelope.
    #[error("API Error :: {0}")]
    Api(String),

    /// The OAuth2 token endpoint refused to issue a token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The user profile lists no accounts.
    #[error("unable to find account for user")]
    NoAccount,

    /// The first account in the user profile has no identifier.
    #[error("unable to determine account id")]
    MissingAccountId,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// A response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),
}

/// Failures raised by a [`crate::http::Transport`] before any response body
/// is available.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}
