use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::token::{Token, TokenResponse};
use crate::config::credentials::CredentialConfig;
use crate::errors::CredentialError;
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;
use crate::sources::TokenEndpoint;
use crate::utils::constants::{GRANT_TYPE_CLIENT_CREDENTIALS, TOKEN_PATH, VALIDATE_PATH};

static ERROR_MSG: &str = "error";
static SUCCESS_MSG: &str = "success";

/// HTTP client for the `/oauth/token` and `/oauth/validate` endpoints,
/// authenticating with HTTP Basic client credentials.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    token_url: Url,
    validate_url: Url,
    client_id: String,
    client_secret: String,
    safety_margin_seconds: u64,
}

impl AuthClient {
    pub fn new(config: &CredentialConfig) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent())
            .build()
            .map_err(|err| CredentialError::Config(format!("http client: {}", err)))?;

        let base_url = config.base_url();
        let base_url = base_url.trim_end_matches('/');

        Ok(Self {
            client,
            token_url: endpoint_url(base_url, TOKEN_PATH)?,
            validate_url: endpoint_url(base_url, VALIDATE_PATH)?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            safety_margin_seconds: config.safety_margin_seconds,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn validate_url(&self) -> &Url {
        &self.validate_url
    }

    async fn exchange(&self) -> Result<Token, ExchangeFailure> {
        let response = self
            .client
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeFailure::Status(status));
        }

        let body = response.text().await?;
        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| ExchangeFailure::Parse(err.to_string()))?;

        Token::issue(token_response, Utc::now(), self.safety_margin_seconds)
            .map_err(|err| ExchangeFailure::Parse(err.to_string()))
    }
}

#[derive(Debug, Error)]
enum ExchangeFailure {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint responded {0}")]
    Status(StatusCode),
    #[error("unparseable token response: {0}")]
    Parse(String),
}

impl ExchangeFailure {
    fn reason(&self) -> &'static str {
        match self {
            ExchangeFailure::Transport(_) => "transport",
            ExchangeFailure::Status(_) => "status",
            ExchangeFailure::Parse(_) => "parse",
        }
    }
}

impl TokenEndpoint for AuthClient {
    async fn verify(&self, token: &Token) -> bool {
        let metrics = get_metrics().await;
        let result = self
            .client
            .post(self.validate_url.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token.access_token.as_str())])
            .send()
            .await;

        let valid = match result {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                info!(status = %response.status(), "cached token rejected");
                false
            }
            Err(err) => {
                warn!(error = %err, "token validation request failed");
                false
            }
        };

        metrics
            .validations
            .with_label_values(&[if valid { "valid" } else { "invalid" }])
            .inc();
        valid
    }

    async fn acquire(&self) -> Result<Token, CredentialError> {
        let metrics = get_metrics().await;
        let start = get_instant();
        metrics.acquisitions.inc();
        debug!(url = %self.token_url, "request new token");

        match self.exchange().await {
            Ok(token) => {
                metrics
                    .acquisition_duration
                    .with_label_values(&[SUCCESS_MSG])
                    .observe(start.elapsed().as_secs_f64());
                info!(outdated_at = %token.outdated_at, "new token acquired");
                Ok(token)
            }
            Err(failure) => {
                metrics
                    .acquisition_duration
                    .with_label_values(&[ERROR_MSG])
                    .observe(start.elapsed().as_secs_f64());
                metrics.acquisition_failures.with_label_values(&[failure.reason()]).inc();
                Err(CredentialError::Acquisition(failure.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("token_url", &self.token_url.as_str())
            .field("validate_url", &self.validate_url.as_str())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

fn endpoint_url(base_url: &str, path: &str) -> Result<Url, CredentialError> {
    Url::parse(&format!("{}{}", base_url, path))
        .map_err(|err| CredentialError::Config(format!("invalid endpoint url '{}{}': {}", base_url, path, err)))
}
