//! Synchronous named-event publish/subscribe.
//!
//! Observers subscribe to an event name; `publish` runs every handler
//! registered under the event's name in registration order before returning.
//! The handler list is snapshotted before delivery, so a handler may publish
//! to (or subscribe on) the same bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::http::HttpMethod;
use crate::types::TokenData;

pub const NEW_ACCESS_TOKEN: &str = "new_access_token";
pub const NEW_TOKEN: &str = "new_token";
pub const API_REQUEST_INIT: &str = "api_request_init";
pub const API_REQUEST_SEND: &str = "api_request_send";
pub const API_REQUEST_COMPLETE: &str = "api_request_complete";

/// An event published on an [`EventBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiEvent {
    /// A token provider obtained a token.
    NewAccessToken(TokenData),
    /// The client re-emits a provider's token under this name.
    NewToken(TokenData),
    RequestInit {
        url: String,
    },
    RequestSend {
        url: String,
        method: HttpMethod,
        body: Option<String>,
    },
    RequestComplete {
        url: String,
        response: Value,
    },
}

impl ApiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ApiEvent::NewAccessToken(_) => NEW_ACCESS_TOKEN,
            ApiEvent::NewToken(_) => NEW_TOKEN,
            ApiEvent::RequestInit { .. } => API_REQUEST_INIT,
            ApiEvent::RequestSend { .. } => API_REQUEST_SEND,
            ApiEvent::RequestComplete { .. } => API_REQUEST_COMPLETE,
        }
    }
}

type Handler = Arc<dyn Fn(&ApiEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, name: &str, handler: F)
    where
        F: Fn(&ApiEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn publish(&self, event: &ApiEvent) {
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(event.name()) {
                Some(list) => list.clone(),
                None => return,
            }
        };
        for handler in snapshot {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(url: &str) -> ApiEvent {
        ApiEvent::RequestInit { url: url.to_string() }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(API_REQUEST_INIT, move |_| seen.lock().unwrap().push(tag));
        }

        bus.publish(&init("http://x"));

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_name_is_delivered() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(API_REQUEST_SEND, move |event| {
            sink.lock().unwrap().push(event.name())
        });

        bus.publish(&init("http://x"));
        bus.publish(&ApiEvent::RequestSend {
            url: "http://x".into(),
            method: HttpMethod::Get,
            body: None,
        });

        assert_eq!(*seen.lock().unwrap(), vec![API_REQUEST_SEND]);
    }

    #[test]
    fn handler_may_publish_on_same_bus() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&bus);
        bus.subscribe(NEW_ACCESS_TOKEN, move |event| {
            if let ApiEvent::NewAccessToken(token) = event {
                inner.publish(&ApiEvent::NewToken(token.clone()));
            }
        });
        let sink = Arc::clone(&seen);
        bus.subscribe(NEW_TOKEN, move |event| sink.lock().unwrap().push(event.clone()));

        let token = TokenData {
            access_token: "abc".into(),
            ..TokenData::default()
        };
        bus.publish(&ApiEvent::NewAccessToken(token.clone()));

        assert_eq!(*seen.lock().unwrap(), vec![ApiEvent::NewToken(token)]);
    }
}
