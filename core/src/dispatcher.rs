//! Authenticated request dispatch.
//!
//! # Design
//! `Dispatcher::dispatch` turns a server-relative path into an authenticated
//! request: it makes sure the token provider holds a token, appends the
//! token and API key to the query string, sends the request, and classifies
//! the decoded body. The platform reports an expired token inside the body,
//! not through the status code, so expiry is only visible after the call.
//! When that happens the token is cleared and the original call replayed
//! exactly once from its undecorated path. A second expiry in a row is
//! surfaced to the caller rather than retried.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, debug_span, warn};
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::error::ApiError;
use crate::events::{ApiEvent, EventBus};
use crate::http::{HttpMethod, HttpRequest, Transport};
use crate::validate::{classify, Verdict, EXPIRED_ACCESS_TOKEN};

/// Everything needed to replay a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub path: String,
    pub method: HttpMethod,
    pub body: Option<String>,
    /// MIME subtype; sent as `application/<content_type>`.
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Allowed,
    Spent,
}

pub struct Dispatcher {
    base_url: String,
    user_key: String,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    events: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        base_url: &str,
        user_key: impl Into<String>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_key: user_key.into(),
            transport,
            tokens,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Send an authenticated request and return the decoded response body.
    ///
    /// `path` may already carry a query string. Fails with
    /// `ApiError::MissingToken` before any HTTP traffic if the token
    /// provider comes back empty-handed.
    pub fn dispatch(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Value, ApiError> {
        let pending = PendingRequest {
            path: path.to_string(),
            method,
            body: body.map(str::to_string),
            content_type: content_type.map(str::to_string),
        };
        let span = debug_span!("dispatch", call_id = %Uuid::new_v4(), %method, path);
        let _guard = span.enter();
        self.send(&pending, Replay::Allowed)
    }

    fn send(&self, pending: &PendingRequest, replay: Replay) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, pending.path);
        self.events.publish(&ApiEvent::RequestInit { url: url.clone() });

        self.tokens.authenticate()?;
        let token = self.tokens.access_token().ok_or(ApiError::MissingToken)?;

        let mut headers = Vec::new();
        if let Some(subtype) = &pending.content_type {
            headers.push(("content-type".to_string(), format!("application/{subtype}")));
        }
        let request = HttpRequest {
            method: pending.method,
            url: authenticated_url(&url, &token, &self.user_key),
            headers,
            body: pending.body.clone(),
        };

        self.events.publish(&ApiEvent::RequestSend {
            url: request.url.clone(),
            method: request.method,
            body: request.body.clone(),
        });
        debug!(replay = (replay == Replay::Spent), "sending request");

        let response = self.transport.execute(&request)?.decode();

        self.events.publish(&ApiEvent::RequestComplete {
            url: request.url,
            response: response.clone(),
        });

        match classify(&response)? {
            Verdict::Ok => Ok(response),
            Verdict::Expired if replay == Replay::Allowed => {
                warn!("access token expired, replaying request with a fresh token");
                self.tokens.clear_access_token();
                self.send(pending, Replay::Spent)
            }
            Verdict::Expired => {
                warn!("access token expired again after refresh");
                Err(ApiError::Api(EXPIRED_ACCESS_TOKEN.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Append `access_token` and `user_key` to `url`'s query string.
pub fn authenticated_url(url: &str, token: &str, user_key: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}access_token={}&user_key={}",
        urlencoding::encode(token),
        urlencoding::encode(user_key)
    )
}
