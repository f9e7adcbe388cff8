use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::helpers::time::outdated_at;

pub const OUTDATED_AT_FIELD: &str = "outdatedAt";
const DEFAULT_AUTH_SCHEME: &str = "bearer";

/// Access token as persisted to the token file.
///
/// Field order matches the file layout. Unknown server fields are kept in
/// `extra` and written back untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub token_type: String,
    pub expires_in: u64,
    pub access_token: String,
    /// Derived at issuance, never taken from the server.
    #[serde(rename = "outdatedAt")]
    pub outdated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a successful client-credentials exchange.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
    pub expires_in: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `expires_in` too large to place on the calendar.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("expires_in {0} out of range")]
pub struct ExpiryOutOfRange(pub u64);

impl Token {
    /// Stamps `outdated_at = issued_at + expires_in - safety_margin_seconds`.
    pub fn issue(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        safety_margin_seconds: u64,
    ) -> Result<Self, ExpiryOutOfRange> {
        let TokenResponse {
            token_type,
            access_token,
            expires_in,
            mut extra,
        } = response;
        extra.remove(OUTDATED_AT_FIELD);

        let outdated_at = outdated_at(issued_at, expires_in, safety_margin_seconds)
            .ok_or(ExpiryOutOfRange(expires_in))?;

        Ok(Self {
            token_type,
            expires_in,
            access_token,
            outdated_at,
            extra,
        })
    }

    pub fn is_outdated(&self, now: DateTime<Utc>) -> bool {
        now >= self.outdated_at
    }

    /// `"{token_type} {access_token}"`, for the auth header of downstream calls.
    pub fn authorization_value(&self) -> String {
        let scheme = match self.token_type.trim() {
            "" => DEFAULT_AUTH_SCHEME,
            scheme => scheme,
        };
        format!("{} {}", scheme, self.access_token)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("access_token", &"***")
            .field("outdated_at", &self.outdated_at)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("access_token", &"***")
            .finish_non_exhaustive()
    }
}
