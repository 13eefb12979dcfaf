use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ApiError;

// Validation constants
const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_USER_AGENT_LENGTH: usize = 256;

const DEFAULT_BASE_URL: &str = "http://localhost:4000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("soapstone/", env!("CARGO_PKG_VERSION"));

/// Connection settings for one server.
///
/// # Examples
///
/// ```rust
/// use soapstone_api::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://social.example")
///     .access_token("secret")
///     .timeout_secs(60)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server root, e.g. `https://social.example`. A path is kept as a prefix.
    pub base_url: String,

    /// OAuth bearer token. Without one the client is logged out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    pub connect_timeout_secs: u64,

    /// Whole-request timeout.
    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if:
    /// - The base URL is not an absolute http(s) URL
    /// - A timeout is outside the valid range
    /// - The access token is empty
    /// - The user agent is empty or too long
    pub fn validate(&self) -> Result<(), ApiError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base URL '{}': {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "base URL must be an http(s) URL (got '{}')",
                self.base_url
            )));
        }

        for (name, value) in [
            ("connect timeout", self.connect_timeout_secs),
            ("timeout", self.timeout_secs),
        ] {
            if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&value) {
                return Err(ApiError::Config(format!(
                    "{name} must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds (got {value})"
                )));
            }
        }

        if self.access_token.as_deref().is_some_and(str::is_empty) {
            return Err(ApiError::Config("access token cannot be empty".to_string()));
        }

        if self.user_agent.is_empty() || self.user_agent.len() > MAX_USER_AGENT_LENGTH {
            return Err(ApiError::Config(format!(
                "user agent length must be between 1 and {MAX_USER_AGENT_LENGTH} characters"
            )));
        }

        Ok(())
    }

    /// Parsed base URL.
    pub fn url(&self) -> Result<Url, ApiError> {
        Ok(Url::parse(&self.base_url)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    pub fn maybe_access_token(mut self, token: Option<String>) -> Self {
        self.config.access_token = token;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
