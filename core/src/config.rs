//! Client configuration.
//!
//! Credentials and endpoint settings are supplied by the caller, either
//! directly or from `TRACKVIA_*` environment variables. A non-default port is
//! spliced into the base URL's authority.

use std::env;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://go.trackvia.com";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    pub user_key: String,
    pub base_url: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        user_key: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            user_key: user_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `TRACKVIA_USERNAME`, `TRACKVIA_PASSWORD` and `TRACKVIA_USER_KEY`
    /// (required) plus the optional `TRACKVIA_BASE_URL`, `TRACKVIA_PORT` and
    /// `TRACKVIA_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let mut config = Self::new(
            required("TRACKVIA_USERNAME")?,
            required("TRACKVIA_PASSWORD")?,
            required("TRACKVIA_USER_KEY")?,
        );
        if let Some(base_url) = lookup("TRACKVIA_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(value) = lookup("TRACKVIA_PORT") {
            config.port = value.parse().map_err(|_| ConfigError::Invalid {
                field: "TRACKVIA_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("TRACKVIA_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!(field = "TRACKVIA_TIMEOUT_SECS", value = %value, "ignoring invalid timeout"),
            }
        }
        Ok(config)
    }

    /// Base URL with the configured port applied and no trailing slash.
    ///
    /// The port is left implicit when it is the scheme's default or when the
    /// base URL already names one.
    pub fn effective_base_url(&self) -> Result<String, ConfigError> {
        let invalid = || ConfigError::Invalid {
            field: "base_url",
            value: self.base_url.clone(),
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        if url.port().is_none() {
            url.set_port(Some(self.port)).map_err(|_| invalid())?;
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}
