use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::cache::token::Token;
use crate::errors::StoreError;
use crate::observability::metrics::get_metrics;
use crate::utils::constants::TOKEN_FILE_SUFFIX;

/// One JSON token file per host.
///
/// Single writer: nothing guards against two processes sharing the file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl AsRef<Path>, host: &str) -> Self {
        let file_name = format!("{}{}", sanitize_host(host), TOKEN_FILE_SUFFIX);
        Self {
            path: dir.as_ref().join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the file is absent or does not hold a token. A file that
    /// cannot be read or parsed is deleted; read faults are still returned.
    pub async fn load(&self) -> Result<Option<Token>, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cached token");
                return Ok(None);
            }
            Err(source) => {
                warn!(path = %self.path.display(), error = %source, "token file unreadable, removing file");
                self.discard().await;
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match serde_json::from_slice::<Token>(&raw) {
            Ok(token) => {
                info!(path = %self.path.display(), "using cached token");
                Ok(Some(token))
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "token not readable, removing file");
                self.discard().await;
                Ok(None)
            }
        }
    }

    /// Best-effort: failures are logged and counted, never returned.
    pub async fn save(&self, token: &Token) {
        match self.write(token).await {
            Ok(()) => debug!(path = %self.path.display(), "token saved"),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "token not saved");
                get_metrics().await.store_write_failures.inc();
            }
        }
    }

    pub async fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    async fn discard(&self) {
        if let Err(err) = self.remove().await {
            warn!(path = %self.path.display(), error = %err, "removing token file failed");
        }
    }

    // tmp -> rename
    async fn write(&self, token: &Token) -> io::Result<()> {
        let content = serde_json::to_vec(token).map_err(io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        fs::rename(&tmp, &self.path).await
    }
}

fn sanitize_host(host: &str) -> String {
    host.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
