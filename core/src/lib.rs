//! Blocking client for the TrackVia open API.
//!
//! # Overview
//! Authenticates with OAuth2, issues CRUD calls against views and records,
//! and publishes request lifecycle events. All calls block the caller until
//! the HTTP exchange (and any token-refresh replay) completes.
//!
//! # Design
//! - `Dispatcher` is the only stateful piece: it decorates each request with
//!   the access token and API key, and replays a call once when the server
//!   reports the token expired inside an otherwise successful response.
//! - `TrackviaClient` methods are thin path/body builders over the dispatcher.
//! - HTTP and OAuth2 sit behind the `Transport` and `TokenProvider` traits so
//!   either can be swapped; `UreqTransport` and `PasswordGrantProvider` are
//!   the defaults.
//! - Session state (user profile, active account) is returned from `login`
//!   rather than stored in the client.

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod http;
pub mod transport;
pub mod types;
pub mod validate;

#[cfg(test)]
mod testing;

pub use auth::{PasswordGrantProvider, TokenProvider};
pub use client::TrackviaClient;
pub use config::ClientConfig;
pub use dispatcher::{Dispatcher, PendingRequest};
pub use error::{ApiError, ConfigError, TransportError};
pub use events::{ApiEvent, EventBus};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use transport::UreqTransport;
pub use types::{Account, Session, TokenData, UserProfile};
pub use validate::{classify, Verdict, EXPIRED_ACCESS_TOKEN};
