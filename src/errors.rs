use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the credential manager.
///
/// Cloneable so a single shared token future can hand the same failure to
/// every reader awaiting it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Rejected at construction time, nothing was started.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The token endpoint could not produce a usable token.
    #[error("failed to acquire token: {0}")]
    Acquisition(String),

    /// The task driving an acquisition was aborted before it finished.
    #[error("token task aborted: {0}")]
    Aborted(String),
}

/// Unexpected faults while reading the token file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token file '{}' unreadable: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
