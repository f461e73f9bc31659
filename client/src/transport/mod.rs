//! Gateway transport: JSON-RPC envelopes over HTTP to a canister.
//!
//! Requests go to `{endpoint}/api/v2/canister/{canister_id}/{query|call}` as
//! `{"jsonrpc":"2.0","id":n,"method":..,"params":[..],"sender":..}` and come
//! back as `{"result": ..}` or `{"error": {"code", "message"}}`. Queries are
//! idempotent and retried with backoff; update calls are sent exactly once.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use muvin_backend_api::Agent;
use reqwest::header::HeaderMap;
use url::Url;

pub mod http;
pub use http::{HttpTransport, TransportConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Update,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Query => "query",
            CallKind::Update => "call",
        }
    }

    pub fn is_idempotent(&self) -> bool {
        matches!(self, CallKind::Query)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Http,
    Rpc,
    Decode,
    CircuitOpen,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Http => "http",
            TransportErrorKind::Rpc => "rpc",
            TransportErrorKind::Decode => "decode",
            TransportErrorKind::CircuitOpen => "circuit_open",
            TransportErrorKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// JSON-RPC error code, when the gateway answered with one.
    pub code: Option<i64>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Rpc,
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(
                f,
                "transport error (class={}, code {code} {}): {}",
                self.kind.as_str(),
                json_rpc_code_meaning(code),
                self.message
            ),
            None => write!(
                f,
                "transport error (class={}): {}",
                self.kind.as_str(),
                self.message
            ),
        }
    }
}

impl std::error::Error for TransportError {}

/// Sends one canister method call and returns the raw `result` value.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        agent: &Agent,
        method: &str,
        kind: CallKind,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;
}

/// Fetches the trust root from a candidate gateway.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn fetch_root_key(&self, endpoint: &Url) -> anyhow::Result<Vec<u8>>;
}

/// Joins `path` under `base`, treating `base` as a directory.
pub fn api_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let with_slash = format!("{}/", dir.path());
        dir.set_path(&with_slash);
    }
    dir.join(path.trim_start_matches('/'))
}

pub fn json_rpc_code_meaning(code: i64) -> &'static str {
    match code {
        -32700 => "Parse error",
        -32600 => "Invalid Request",
        -32601 => "Method not found",
        -32602 => "Invalid params",
        -32603 => "Internal error",
        -32099..=-32000 => "Server error",
        _ => "Unknown error",
    }
}

pub(crate) fn is_retryable_jsonrpc(code: i64) -> bool {
    !matches!(code, -32600 | -32601 | -32602 | -32700)
}

pub(crate) fn compute_backoff(attempt_idx: usize) -> Duration {
    use rand::Rng;

    let base_ms = 100u64.saturating_mul(1u64 << attempt_idx.min(4));
    let jitter = rand::thread_rng().gen_range(0..=(base_ms / 4).max(1));
    let capped = (base_ms + jitter).min(1_600);
    Duration::from_millis(capped)
}

pub(crate) fn retry_after_delay(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.max(1)))
}

pub(crate) fn retry_backoff(attempt_idx: usize, headers: &HeaderMap) -> Duration {
    retry_after_delay(headers).unwrap_or_else(|| compute_backoff(attempt_idx))
}

#[derive(Default)]
pub(crate) struct CircuitState {
    failures: u32,
    tripped_until: Option<Instant>,
}

impl CircuitState {
    pub(crate) fn record_failure(&mut self, threshold: u32, cooldown: Duration) -> Option<Instant> {
        if threshold == 0 {
            return None;
        }
        self.failures = self.failures.saturating_add(1);
        if self.failures >= threshold {
            let until = Instant::now() + cooldown;
            self.tripped_until = Some(until);
            Some(until)
        } else {
            None
        }
    }

    pub(crate) fn reset(&mut self) -> bool {
        let was_active = self.failures > 0 || self.tripped_until.is_some();
        self.failures = 0;
        self.tripped_until = None;
        was_active
    }

    pub(crate) fn is_tripped(&mut self) -> Option<Instant> {
        if let Some(until) = self.tripped_until {
            if Instant::now() < until {
                return Some(until);
            }
            self.tripped_until = None;
            self.failures = 0;
        }
        None
    }
}
