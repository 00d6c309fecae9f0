use std::fmt;
use std::time::Duration;

use crate::errors::ChatError;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Basic-auth credential pair sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for the HTTP client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the agent API (scheme, host and port).
    pub base_url: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<Credentials>,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Optional total timeout per request, streaming body included.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            connect_timeout: Duration::from_secs(10),
            timeout: None,
        }
    }

    /// Builds a config from `AGENT_API_BASE_URL`, `AGENT_USERNAME` and
    /// `AGENT_PASSWORD`.
    ///
    /// Credentials are set only when both username and password are present.
    pub fn from_env() -> Result<Self, ChatError> {
        let base_url = std::env::var("AGENT_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(base_url);
        let username = std::env::var("AGENT_USERNAME").unwrap_or_default();
        let password = std::env::var("AGENT_PASSWORD").unwrap_or_default();
        if !username.is_empty() && !password.is_empty() {
            config = config.credentials(Credentials::new(username, password));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ChatError::Config(format!(
                "base_url must start with http:// or https://, got {base}"
            )));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim().trim_end_matches('/'), path)
    }
}
