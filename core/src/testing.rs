//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::auth::TokenProvider;
use crate::error::{ApiError, TransportError};
use crate::http::{HttpRequest, HttpResponse, Transport};

/// Replays canned response bodies in order and records every request.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new<'a>(bodies: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            responses: Mutex::new(bodies.into_iter().map(str::to_string).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let body = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Request {
                url: request.redacted_url(),
                message: "connection refused".to_string(),
            })?;
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body,
        })
    }
}

/// Hands out `tok1`, `tok2`, ... each time the token is cleared.
pub(crate) struct CountingTokens {
    generation: AtomicUsize,
    held: Mutex<Option<String>>,
    issue: bool,
    pub(crate) authenticated: AtomicUsize,
    pub(crate) cleared: AtomicUsize,
}

impl CountingTokens {
    pub(crate) fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
            held: Mutex::new(None),
            issue: true,
            authenticated: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
        }
    }

    /// A provider whose `authenticate` succeeds without ever holding a token.
    pub(crate) fn broken() -> Self {
        Self {
            issue: false,
            ..Self::new()
        }
    }
}

impl TokenProvider for CountingTokens {
    fn authenticate(&self) -> Result<(), ApiError> {
        self.authenticated.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().unwrap();
        if self.issue && held.is_none() {
            let n = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *held = Some(format!("tok{n}"));
        }
        Ok(())
    }

    fn access_token(&self) -> Option<String> {
        self.held.lock().unwrap().clone()
    }

    fn clear_access_token(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        *self.held.lock().unwrap() = None;
    }
}
