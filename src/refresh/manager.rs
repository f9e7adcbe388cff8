use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::cache::token::Token;
use crate::cache::token_store::TokenStore;
use crate::config::credentials::CredentialConfig;
use crate::errors::CredentialError;
use crate::observability::metrics::get_metrics;
use crate::refresh::scheduler::{Lease, RefreshHandle, RefreshScheduler};
use crate::sources::oauth2::AuthClient;
use crate::sources::TokenEndpoint;
use crate::utils::constants::EVENT_BUFFER_SIZE;

pub type TokenResult = Result<Token, CredentialError>;

/// The published token: pending while an acquisition runs, then resolved to
/// the token or the acquisition error. Clones share the same outcome.
pub type TokenFuture = Shared<BoxFuture<'static, TokenResult>>;

/// Keeps one bearer token for one host.
///
/// Construction loads the token file, checks a cached token against the
/// server and falls back to a fresh acquisition. Every published token arms
/// a refresh timer for its `outdated_at`; when it fires a new token is
/// acquired and replaces the published one.
///
/// Dropping the manager stops the refresh timer.
pub struct CredentialManager<E: TokenEndpoint = AuthClient> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    config: CredentialConfig,
    endpoint: E,
    store: TokenStore,
    current: Mutex<Published>,
    /// Held while a resolved token is saved, armed and announced.
    commit: tokio::sync::Mutex<()>,
    scheduler: RefreshScheduler,
    events: Sender<Token>,
}

struct Published {
    generation: u64,
    future: TokenFuture,
}

impl CredentialManager<AuthClient> {
    /// Talks to `https://{host}` (or `config.base_url`). Needs a Tokio runtime.
    pub fn new(config: CredentialConfig) -> Result<Self, CredentialError> {
        config.validate()?;
        let endpoint = AuthClient::new(&config)?;
        Self::with_endpoint(config, endpoint)
    }
}

impl<E: TokenEndpoint> CredentialManager<E> {
    pub fn with_endpoint(config: CredentialConfig, endpoint: E) -> Result<Self, CredentialError> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|_| CredentialError::Config("must be created inside a Tokio runtime".to_owned()))?;

        let store = TokenStore::new(config.cache_dir(), &config.host);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let inner = Arc::new(Inner {
            config,
            endpoint,
            store,
            current: Mutex::new(Published {
                generation: 0,
                future: future::pending::<TokenResult>().boxed().shared(),
            }),
            commit: tokio::sync::Mutex::new(()),
            scheduler: RefreshScheduler::new(),
            events,
        });

        let lease = inner.scheduler.lease();
        let _ = inner.publish(|generation| inner.clone().load_or_acquire(lease, generation));
        Ok(Self { inner })
    }

    /// The currently published token. Concurrent callers share one
    /// acquisition; none of them starts a new one.
    pub fn token(&self) -> TokenFuture {
        self.inner.current.lock().future.clone()
    }

    /// Token-ready notifications, one per published token. Subscribers only
    /// see tokens published after they subscribed.
    pub fn subscribe(&self) -> Receiver<Token> {
        self.inner.events.subscribe()
    }

    /// Cancels the pending refresh. Acquisitions already in flight still
    /// resolve but do not rearm.
    pub fn stop_refresh(&self) {
        self.inner.scheduler.cancel();
    }

    /// Acquires a new token right away and publishes it, rearming the
    /// refresh timer on success. This is how a failed refresh is recovered.
    ///
    /// When acquisitions overlap, only the latest publication saves its
    /// token, arms the timer and emits token-ready; an earlier one that
    /// resolves later is returned to its own callers and otherwise dropped.
    pub fn refresh(&self) -> TokenFuture {
        let lease = self.inner.scheduler.lease();
        let inner = self.inner.clone();
        self.inner
            .publish(|generation| inner.acquire_and_publish(lease, generation))
    }

    pub fn pending_refresh(&self) -> Option<RefreshHandle> {
        self.inner.scheduler.pending()
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }
}

impl<E: TokenEndpoint> Drop for CredentialManager<E> {
    fn drop(&mut self) {
        self.inner.scheduler.cancel();
    }
}

impl<E: TokenEndpoint> Inner<E> {
    /// Runs the task on its own and makes it the published token. The task
    /// learns its generation so it can tell whether it is still current.
    fn publish<T, F>(&self, task: T) -> TokenFuture
    where
        T: FnOnce(u64) -> F,
        F: Future<Output = TokenResult> + Send + 'static,
    {
        let mut current = self.current.lock();
        let generation = current.generation + 1;
        let handle = tokio::spawn(task(generation));
        let published = async move {
            handle
                .await
                .unwrap_or_else(|err| Err(CredentialError::Aborted(err.to_string())))
        }
        .boxed()
        .shared();

        *current = Published {
            generation,
            future: published.clone(),
        };
        published
    }

    async fn load_or_acquire(self: Arc<Self>, lease: Lease, generation: u64) -> TokenResult {
        match self.store.load().await {
            Ok(Some(token)) => {
                if self.endpoint.verify(&token).await {
                    info!(host = %self.config.host, "cached token is valid");
                    self.commit(lease, generation, &token, false).await;
                    return Ok(token);
                }
                info!(host = %self.config.host, "cached token rejected, requesting a new one");
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "cached token unavailable"),
        }

        self.acquire_and_publish(lease, generation).await
    }

    async fn acquire_and_publish(self: Arc<Self>, lease: Lease, generation: u64) -> TokenResult {
        match self.endpoint.acquire().await {
            Ok(token) => {
                self.commit(lease, generation, &token, true).await;
                Ok(token)
            }
            Err(err) => {
                // no retry: readers see the error until the next refresh()
                error!(host = %self.config.host, error = %err, "token acquisition failed");
                Err(err)
            }
        }
    }

    async fn commit(self: &Arc<Self>, lease: Lease, generation: u64, token: &Token, persist: bool) {
        let _guard = self.commit.lock().await;
        if self.current.lock().generation != generation {
            debug!(generation, "superseded by a newer publication, not committing");
            return;
        }
        if persist {
            self.store.save(token).await;
        }
        self.arm(lease, token).await;
        self.notify(token);
    }

    async fn arm(self: &Arc<Self>, lease: Lease, token: &Token) {
        let weak = Arc::downgrade(self);
        let armed = self.scheduler.schedule(lease, token.outdated_at, move |handle, lease| {
            if let Some(inner) = weak.upgrade() {
                inner.on_refresh_due(handle, lease);
            }
        });

        if armed.is_some() {
            let metrics = get_metrics().await;
            metrics.refreshes_scheduled.inc();
            metrics.token_outdated_at_unix.set(token.outdated_at.timestamp());
        }
    }

    fn on_refresh_due(self: Arc<Self>, handle: RefreshHandle, lease: Lease) {
        info!(%handle, host = %self.config.host, "token outdated, requesting a new one");
        let inner = self.clone();
        let _ = self.publish(|generation| inner.acquire_and_publish(lease, generation));
    }

    fn notify(&self, token: &Token) {
        if self.events.send(token.clone()).is_err() {
            debug!("token ready, no subscribers");
        }
    }
}
