//! Blocking `Transport` backed by `ureq`.

use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// Executes requests with a shared `ureq::Agent`.
///
/// Status-code-as-error is disabled so 4xx/5xx responses come back as data
/// and the dispatcher can inspect their bodies.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TIMEOUT)
    }
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let content_type = req.header("content-type");

        let result = match (req.method, req.body.as_deref()) {
            (HttpMethod::Get, _) => self.agent.get(&req.url).call(),
            (HttpMethod::Delete, _) => self.agent.delete(&req.url).call(),
            (HttpMethod::Post, Some(body)) => match content_type {
                Some(ct) => self.agent.post(&req.url).content_type(ct).send(body.as_bytes()),
                None => self.agent.post(&req.url).send(body.as_bytes()),
            },
            (HttpMethod::Post, None) => self.agent.post(&req.url).send_empty(),
            (HttpMethod::Put, Some(body)) => match content_type {
                Some(ct) => self.agent.put(&req.url).content_type(ct).send(body.as_bytes()),
                None => self.agent.put(&req.url).send(body.as_bytes()),
            },
            (HttpMethod::Put, None) => self.agent.put(&req.url).send_empty(),
        };

        let mut response = result.map_err(|err| TransportError::Request {
            url: req.redacted_url(),
            message: scrub(req, err),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::Body {
                url: req.redacted_url(),
                message: scrub(req, err),
            })?;

        debug!(method = %req.method, status, bytes = body.len(), "transport exchange finished");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Error text with any echo of the authenticated URL replaced by its
/// redacted form.
fn scrub(req: &HttpRequest, err: ureq::Error) -> String {
    err.to_string().replace(&req.url, &req.redacted_url())
}
