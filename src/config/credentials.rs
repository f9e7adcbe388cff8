use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::CredentialError;
use crate::utils::constants::{
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_SAFETY_MARGIN_SECS, DEFAULT_USER_AGENT,
};

/// ================================
/// Client credentials for one authorization host
/// ================================
#[derive(Clone, Deserialize)]
pub struct CredentialConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Authorization host, e.g. `api.example.com`. Also names the token file.
    pub host: String,
    /// Directory holding the token file, the working directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Overrides `https://{host}` as the base of the oauth endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_safety_margin_seconds")]
    pub safety_margin_seconds: u64,
}

impl CredentialConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            host: host.into(),
            cache_dir: None,
            base_url: None,
            timeout_ms: default_timeout_ms(),
            user_agent: None,
            safety_margin_seconds: default_safety_margin_seconds(),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_safety_margin_seconds(mut self, seconds: u64) -> Self {
        self.safety_margin_seconds = seconds;
        self
    }

    /// Client id, secret and host are all required.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.client_id.trim().is_empty() {
            return Err(CredentialError::Config("invalid client ID".to_owned()));
        }
        if self.client_secret.is_empty() {
            return Err(CredentialError::Config("invalid client secret".to_owned()));
        }
        if self.host.trim().is_empty() {
            return Err(CredentialError::Config("invalid api host".to_owned()));
        }
        if self.timeout_ms == 0 {
            return Err(CredentialError::Config("timeout_ms must be positive".to_owned()));
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.host))
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

// keeps the secret out of logs
impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("host", &self.host)
            .field("cache_dir", &self.cache_dir)
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("safety_margin_seconds", &self.safety_margin_seconds)
            .finish()
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_safety_margin_seconds() -> u64 {
    DEFAULT_SAFETY_MARGIN_SECS
}
