//! # Credential Agent Library
//!
//! Keeps an OAuth2 client-credentials bearer token available for a single
//! API host: loads a cached token from disk, checks it against the
//! authorization server, acquires a fresh one when needed and refreshes it
//! shortly before it runs out.
//!
//! Modules:
//! - `config`: credentials, service settings and YAML loading
//! - `cache`: token model and the per-host token file
//! - `sources`: validation and client-credentials exchange endpoints
//! - `refresh`: refresh scheduler and the credential manager
//! - `observability`: prometheus metrics and their HTTP route

pub mod config;
pub mod cache;
pub mod sources;
pub mod refresh;
pub mod errors;
pub mod observability;
pub mod server;
pub mod helpers;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::cache::token::Token;
pub use crate::config::credentials::CredentialConfig;
pub use crate::errors::CredentialError;
pub use crate::refresh::manager::{CredentialManager, TokenFuture};
