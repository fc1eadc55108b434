//! Access-token providers.
//!
//! # Design
//! The dispatcher only needs three things from authentication: make sure a
//! token exists, read it, and throw it away when the server says it expired.
//! `TokenProvider` captures exactly that. `PasswordGrantProvider` is the
//! stock implementation: OAuth2 password grant for the first token, refresh
//! grant afterwards, falling back to the password grant when the refresh
//! token is rejected.
//!
//! Token state sits behind one `Mutex`, and the token endpoint is called
//! while holding it, so concurrent callers never race two handshakes or
//! observe a half-written token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::{ApiEvent, EventBus};
use crate::http::{HttpMethod, HttpRequest, Transport};
use crate::types::TokenData;

/// OAuth2 client id the platform assigns to API users.
pub const CLIENT_ID: &str = "TrackViaAPI";
pub const TOKEN_PATH: &str = "/oauth/token";

pub trait TokenProvider: Send + Sync {
    /// Ensure a usable access token is held, running a handshake if needed.
    fn authenticate(&self) -> Result<(), ApiError>;

    fn access_token(&self) -> Option<String>;

    /// Forget the current access token so the next `authenticate` fetches
    /// a fresh one.
    fn clear_access_token(&self);

    /// Bus on which the provider publishes `new_access_token`, if any.
    fn events(&self) -> Option<&EventBus> {
        None
    }
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenState {
    fn is_live(&self, now: Instant) -> bool {
        self.access_token.is_some() && self.expires_at.map_or(true, |deadline| now < deadline)
    }

    fn store(&mut self, token: &TokenData, now: Instant) {
        self.access_token = Some(token.access_token.clone());
        if token.refresh_token.is_some() {
            self.refresh_token = token.refresh_token.clone();
        }
        self.expires_at = token
            .expires_in
            .map(|secs| now + Duration::from_secs(secs));
    }
}

/// Resource-owner password grant against `<base>/oauth/token`.
pub struct PasswordGrantProvider {
    token_url: String,
    username: String,
    password: String,
    transport: Arc<dyn Transport>,
    state: Mutex<TokenState>,
    events: EventBus,
}

impl PasswordGrantProvider {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            token_url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
            transport,
            state: Mutex::new(TokenState::default()),
            events: EventBus::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn password_grant(&self) -> Result<TokenData, ApiError> {
        debug!(username = %self.username, "requesting token with password grant");
        self.request_token(&[
            ("grant_type", "password"),
            ("client_id", CLIENT_ID),
            ("username", &self.username),
            ("password", &self.password),
        ])
    }

    fn refresh_grant(&self, refresh_token: &str) -> Result<TokenData, ApiError> {
        debug!("requesting token with refresh grant");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("client_id", CLIENT_ID),
            ("refresh_token", refresh_token),
        ])
    }

    fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenData, ApiError> {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.token_url.clone(),
            headers: vec![(
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            )],
            body: Some(
                serde_urlencoded::to_string(params)
                    .map_err(|e| ApiError::SerializationError(e.to_string()))?,
            ),
        };
        let response = self.transport.execute(&request)?.decode();

        if let Some(description) = response
            .get("error_description")
            .filter(|description| !description.is_null())
        {
            let message = description
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| description.to_string());
            return Err(ApiError::Auth(message));
        }
        serde_json::from_value(response)
            .map_err(|e| ApiError::Auth(format!("invalid token response: {e}")))
    }
}

impl TokenProvider for PasswordGrantProvider {
    fn authenticate(&self) -> Result<(), ApiError> {
        let issued = {
            let mut state = self.lock();
            if state.is_live(Instant::now()) {
                return Ok(());
            }
            let token = match state.refresh_token.clone() {
                Some(refresh) => match self.refresh_grant(&refresh) {
                    Ok(token) => token,
                    Err(ApiError::Auth(reason)) => {
                        warn!(%reason, "refresh token rejected, falling back to password grant");
                        state.refresh_token = None;
                        self.password_grant()?
                    }
                    Err(err) => return Err(err),
                },
                None => self.password_grant()?,
            };
            state.store(&token, Instant::now());
            token
        };

        info!(expires_in = ?issued.expires_in, "issued new access token");
        self.events.publish(&ApiEvent::NewAccessToken(issued));
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    fn clear_access_token(&self) {
        let mut state = self.lock();
        state.access_token = None;
        state.expires_at = None;
    }

    fn events(&self) -> Option<&EventBus> {
        Some(&self.events)
    }
}

impl std::fmt::Debug for PasswordGrantProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrantProvider")
            .field("token_url", &self.token_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
