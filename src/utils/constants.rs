//! Shared constants and invariants

/// Renewal starts this long before the server-reported expiry.
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 3600;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_USER_AGENT: &str = concat!("credential-agent/", env!("CARGO_PKG_VERSION"));

// Authorization server endpoints, relative to the base url
pub const TOKEN_PATH: &str = "/oauth/token";
pub const VALIDATE_PATH: &str = "/oauth/validate";
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";

// Token file
pub const TOKEN_FILE_SUFFIX: &str = ".token.json";

// token-ready notifications kept for slow subscribers
pub const EVENT_BUFFER_SIZE: usize = 16;
