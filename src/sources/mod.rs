/// Sources module
///
/// The authorization server seen from the credential manager: validating a
/// cached token and exchanging client credentials for a new one.

pub mod oauth2;

use std::future::Future;

use crate::cache::token::Token;
use crate::errors::CredentialError;

pub trait TokenEndpoint: Send + Sync + 'static {
    /// True only if the server accepts the token. Never fails.
    fn verify(&self, token: &Token) -> impl Future<Output = bool> + Send;

    /// Client-credentials exchange, `outdated_at` already stamped.
    fn acquire(&self) -> impl Future<Output = Result<Token, CredentialError>> + Send;
}
