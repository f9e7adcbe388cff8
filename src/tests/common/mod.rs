// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use chrono::{TimeDelta, Utc};
use http::{header, HeaderMap, StatusCode};
use serde_json::Map;
use tokio::sync::Notify;

use crate::cache::token::{Token, TokenResponse};
use crate::config::credentials::CredentialConfig;
use crate::errors::CredentialError;
use crate::sources::TokenEndpoint;
use crate::utils::constants::DEFAULT_SAFETY_MARGIN_SECS;

pub const HOST: &str = "auth.test";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn config_for(dir: &Path) -> CredentialConfig {
    CredentialConfig::new("client", "secret", HOST).with_cache_dir(dir)
}

pub fn token_response(access_token: &str, expires_in: u64) -> TokenResponse {
    TokenResponse {
        token_type: "bearer".to_owned(),
        access_token: access_token.to_owned(),
        expires_in,
        extra: Map::new(),
    }
}

/// A token as if read back from the token file, due for refresh in `outdated_in`.
pub fn cached_token(access_token: &str, outdated_in: TimeDelta) -> Token {
    Token {
        token_type: "bearer".to_owned(),
        expires_in: 7200,
        access_token: access_token.to_owned(),
        outdated_at: Utc::now() + outdated_in,
        extra: Map::new(),
    }
}

/// Polls `condition` every 10ms, false if it never held within `limit`.
pub async fn eventually<F: FnMut() -> bool>(limit: Duration, mut condition: F) -> bool {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

// -------------------------------
// Mock authorization server
// -------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Clone)]
pub struct AuthServer {
    pub token_calls: Arc<AtomicUsize>,
    pub validate_calls: Arc<AtomicUsize>,
    /// Popped per call, the last entry keeps answering.
    pub token_responses: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    pub validate_status: Arc<Mutex<StatusCode>>,
    pub validate_delay: Arc<Mutex<Duration>>,
    pub token_requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub validate_requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Default for AuthServer {
    fn default() -> Self {
        Self {
            token_calls: Arc::default(),
            validate_calls: Arc::default(),
            token_responses: Arc::default(),
            validate_status: Arc::new(Mutex::new(StatusCode::OK)),
            validate_delay: Arc::new(Mutex::new(Duration::ZERO)),
            token_requests: Arc::default(),
            validate_requests: Arc::default(),
        }
    }
}

impl AuthServer {
    pub fn respond_token(&self, status: StatusCode, body: impl Into<String>) -> &Self {
        self.token_responses.lock().unwrap().push_back((status, body.into()));
        self
    }

    pub fn respond_validate(&self, status: StatusCode) -> &Self {
        *self.validate_status.lock().unwrap() = status;
        self
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Serves `/oauth/token` and `/oauth/validate`, returns the base url.
    pub async fn spawn(&self) -> (JoinHandle<()>, String) {
        let router = Router::new()
            .route("/oauth/token", post(token_handler))
            .route("/oauth/validate", post(validate_handler))
            .with_state(self.clone());
        let (handle, addr) = spawn_axum(router).await;
        (handle, format!("http://{}", addr))
    }
}

fn record(headers: &HeaderMap, body: String) -> RecordedRequest {
    let value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    RecordedRequest {
        authorization: value(header::AUTHORIZATION),
        user_agent: value(header::USER_AGENT),
        content_type: value(header::CONTENT_TYPE),
        body,
    }
}

async fn token_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    server.token_calls.fetch_add(1, Ordering::SeqCst);
    server.token_requests.lock().unwrap().push(record(&headers, body));
    let mut responses = server.token_responses.lock().unwrap();
    let response = if responses.len() > 1 {
        responses.pop_front()
    } else {
        responses.front().cloned()
    };
    response.unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no token scripted".to_owned()))
}

async fn validate_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    server.validate_calls.fetch_add(1, Ordering::SeqCst);
    server.validate_requests.lock().unwrap().push(record(&headers, body));
    let delay = *server.validate_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let status = *server.validate_status.lock().unwrap();
    status
}

pub fn token_body(access_token: &str, expires_in: u64) -> String {
    json!({"token_type": "bearer", "access_token": access_token, "expires_in": expires_in}).to_string()
}

// -------------------------------
// In-process endpoint, no network
// -------------------------------

#[derive(Debug, Clone)]
pub enum Scripted {
    Token { access_token: String, expires_in: u64 },
    Fail(String),
    /// Claimed in call order, answered after the delay.
    Delayed(Duration, Box<Scripted>),
}

impl Scripted {
    pub fn token(access_token: &str, expires_in: u64) -> Self {
        Scripted::Token {
            access_token: access_token.to_owned(),
            expires_in,
        }
    }
}

#[derive(Clone)]
pub struct FakeEndpoint {
    pub verify_result: Arc<AtomicBool>,
    pub verify_calls: Arc<AtomicUsize>,
    pub acquire_calls: Arc<AtomicUsize>,
    /// Popped per acquisition, the last entry keeps answering.
    pub script: Arc<Mutex<VecDeque<Scripted>>>,
    pub acquire_delay: Duration,
    /// When set, every call waits for one `notify_one`.
    pub gate: Option<Arc<Notify>>,
}

impl FakeEndpoint {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            verify_result: Arc::new(AtomicBool::new(true)),
            verify_calls: Arc::default(),
            acquire_calls: Arc::default(),
            script: Arc::new(Mutex::new(script.into())),
            acquire_delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn rejecting(self) -> Self {
        self.verify_result.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Option<Scripted> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

impl TokenEndpoint for FakeEndpoint {
    async fn verify(&self, _token: &Token) -> bool {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verify_result.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> Result<Token, CredentialError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.next() {
            Some(Scripted::Delayed(delay, then)) => {
                tokio::time::sleep(delay).await;
                Some(*then)
            }
            other => other,
        };
        match next {
            Some(Scripted::Token { access_token, expires_in }) => Ok(Token::issue(
                token_response(&access_token, expires_in),
                Utc::now(),
                DEFAULT_SAFETY_MARGIN_SECS,
            )
            .unwrap()),
            Some(Scripted::Fail(msg)) => Err(CredentialError::Acquisition(msg)),
            Some(Scripted::Delayed(..)) | None => Err(CredentialError::Acquisition("nothing scripted".to_owned())),
        }
    }
}
