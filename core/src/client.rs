//! Endpoint methods for the platform's open API.
//!
//! # Design
//! Every method only builds a path (and, for record writes, a JSON body) and
//! hands it to the [`Dispatcher`]; authentication, expiry handling and error
//! envelopes are dealt with there. String parameters are percent-encoded
//! before they are placed in the URL.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::{PasswordGrantProvider, TokenProvider};
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ApiError, ConfigError};
use crate::events::{ApiEvent, EventBus, NEW_ACCESS_TOKEN};
use crate::http::{HttpMethod, Transport};
use crate::transport::UreqTransport;
use crate::types::{Session, UserProfile};

/// Content-type subtype used for record writes.
pub const JSON_CONTENT_TYPE: &str = "json;charset=UTF-8";

pub const DEFAULT_PAGE_START: u32 = 0;
pub const DEFAULT_PAGE_MAX: u32 = 1000;

#[derive(Debug)]
pub struct TrackviaClient {
    dispatcher: Dispatcher,
}

impl TrackviaClient {
    /// Client talking to the configured server over `ureq`, authenticating
    /// with the OAuth2 password grant.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url = config.effective_base_url()?;
        let transport: Arc<dyn Transport> = Arc::new(UreqTransport::new(config.timeout));
        let tokens = Arc::new(PasswordGrantProvider::new(
            &base_url,
            config.username.clone(),
            config.password.clone(),
            Arc::clone(&transport),
        ));
        Ok(Self::with_parts(&base_url, config.user_key.clone(), transport, tokens))
    }

    /// Client over caller-supplied collaborators.
    ///
    /// Tokens the provider announces as `new_access_token` are re-published
    /// on the client's bus as `new_token`.
    pub fn with_parts(
        base_url: &str,
        user_key: impl Into<String>,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        if let Some(provider_events) = tokens.events() {
            let relay = Arc::clone(&events);
            provider_events.subscribe(NEW_ACCESS_TOKEN, move |event| {
                if let ApiEvent::NewAccessToken(token) = event {
                    relay.publish(&ApiEvent::NewToken(token.clone()));
                }
            });
        }
        Self {
            dispatcher: Dispatcher::new(base_url, user_key, transport, tokens, events),
        }
    }

    pub fn events(&self) -> &EventBus {
        self.dispatcher.events()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Make sure a token is held without issuing an API call.
    pub fn authenticate(&self) -> Result<(), ApiError> {
        self.dispatcher.tokens().authenticate()
    }

    /// Fetch the current user and select the first listed account.
    pub fn login(&self) -> Result<Session, ApiError> {
        let user: UserProfile = serde_json::from_value(self.current_user()?)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?;
        let account = user.accounts.first().ok_or(ApiError::NoAccount)?;
        let account_id = account.id.ok_or(ApiError::MissingAccountId)?;
        info!(account_id, "logged in");
        Ok(Session { user, account_id })
    }

    pub fn current_user(&self) -> Result<Value, ApiError> {
        self.get("/openapi/users/me")
    }

    pub fn views(&self) -> Result<Value, ApiError> {
        self.get("/openapi/views")
    }

    /// Views whose name matches `name` exactly.
    pub fn views_named(&self, name: &str) -> Result<Value, ApiError> {
        self.get(&format!("/openapi/views?name={}", urlencoding::encode(name)))
    }

    /// One page of a view's records, plus field metadata.
    pub fn records_in_view(&self, view_id: u64, start: u32, max: u32) -> Result<Value, ApiError> {
        self.get(&format!("/openapi/views/{view_id}?start={start}&max={max}"))
    }

    pub fn search_records(
        &self,
        view_id: u64,
        query: &str,
        start: u32,
        max: u32,
    ) -> Result<Value, ApiError> {
        self.get(&format!(
            "/openapi/views/{view_id}/find?start={start}&max={max}&q={}",
            urlencoding::encode(query)
        ))
    }

    pub fn apps(&self) -> Result<Value, ApiError> {
        self.get("/openapi/apps")
    }

    pub fn users(&self) -> Result<Value, ApiError> {
        self.get("/openapi/users")
    }

    /// `time_zone` is a zone name such as `America/Denver`.
    pub fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        time_zone: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut path = format!(
            "/openapi/users?firstName={}&lastName={}&email={}",
            urlencoding::encode(first_name),
            urlencoding::encode(last_name),
            urlencoding::encode(email)
        );
        if let Some(zone) = time_zone {
            path.push_str(&format!("&timeZone={}", urlencoding::encode(zone)));
        }
        self.dispatcher.dispatch(&path, HttpMethod::Post, None, None)
    }

    pub fn record(&self, view_id: u64, record_id: u64) -> Result<Value, ApiError> {
        self.get(&format!("/openapi/views/{view_id}/records/{record_id}"))
    }

    pub fn create_record<T: Serialize + ?Sized>(
        &self,
        view_id: u64,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_json(data)?;
        self.dispatcher.dispatch(
            &format!("/openapi/views/{view_id}/records"),
            HttpMethod::Post,
            Some(&body),
            Some(JSON_CONTENT_TYPE),
        )
    }

    pub fn update_record<T: Serialize + ?Sized>(
        &self,
        view_id: u64,
        record_id: u64,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_json(data)?;
        self.dispatcher.dispatch(
            &format!("/openapi/views/{view_id}/records/{record_id}"),
            HttpMethod::Put,
            Some(&body),
            Some(JSON_CONTENT_TYPE),
        )
    }

    pub fn delete_record(&self, view_id: u64, record_id: u64) -> Result<Value, ApiError> {
        self.dispatcher.dispatch(
            &format!("/openapi/views/{view_id}/records/{record_id}"),
            HttpMethod::Delete,
            None,
            None,
        )
    }

    fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.dispatcher.dispatch(path, HttpMethod::Get, None, None)
    }
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> Result<String, ApiError> {
    serde_json::to_string(data).map_err(|e| ApiError::SerializationError(e.to_string()))
}
