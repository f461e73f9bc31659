use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use muvin_backend_api::Agent;
use reqwest::{header::HeaderValue, Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::{
    api_url, compute_backoff, is_retryable_jsonrpc, json_rpc_code_meaning, retry_backoff,
    CallKind, CircuitState, Handshake, Transport, TransportError, TransportErrorKind,
};
use crate::config::ClientConfig;

#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
    pub retries: usize,
    pub circuit_breaker_failures: u32,
    pub circuit_breaker_cooldown: Duration,
}

impl From<&ClientConfig> for TransportConfig {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            http_timeout: cfg.http_timeout,
            connect_timeout: cfg.connect_timeout,
            retries: cfg.retries,
            circuit_breaker_failures: cfg.circuit_breaker_failures,
            circuit_breaker_cooldown: cfg.circuit_breaker_cooldown,
        }
    }
}

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

fn rpc_context(method: &str, url: &Url, request_id: u64) -> String {
    let host = url.host_str().unwrap_or("<unknown>");
    format!("{method} via host={host}, request_id={request_id}")
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    root_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

/// reqwest-backed gateway client with retries and a per-origin circuit breaker.
pub struct HttpTransport {
    http: HttpClient,
    cfg: TransportConfig,
    circuits: Mutex<HashMap<String, CircuitState>>,
}

impl HttpTransport {
    pub fn new(cfg: TransportConfig) -> Result<Self> {
        let timeout = cfg.http_timeout.max(Duration::from_millis(100));
        let connect_timeout = cfg.connect_timeout.max(Duration::from_millis(100));
        let http = HttpClient::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .context("building gateway HTTP client")?;
        Ok(Self::with_http_client(cfg, http))
    }

    pub fn with_http_client(cfg: TransportConfig, http: HttpClient) -> Self {
        Self {
            http,
            cfg,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    fn call_url(agent: &Agent, kind: CallKind) -> Result<Url, TransportError> {
        let endpoint = agent.endpoint().ok_or_else(|| {
            TransportError::new(TransportErrorKind::Connect, "no resolved endpoint")
        })?;
        let path = format!("api/v2/canister/{}/{}", agent.canister_id(), kind.as_str());
        api_url(endpoint, &path)
            .map_err(|e| TransportError::new(TransportErrorKind::Other, format!("bad url: {e}")))
    }

    fn auth_header(agent: &Agent) -> Result<Option<HeaderValue>, TransportError> {
        agent
            .identity()
            .and_then(|id| id.delegation.as_deref())
            .map(|token| {
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                    TransportError::new(TransportErrorKind::Other, format!("bad delegation: {e}"))
                })
            })
            .transpose()
    }

    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
        auth: Option<&HeaderValue>,
        kind: CallKind,
    ) -> Result<serde_json::Value, TransportError> {
        let origin = url.origin().ascii_serialization();
        let apply_circuit = self.cfg.circuit_breaker_failures > 0;
        let mut allow_circuit_updates = false;

        if apply_circuit {
            match self.circuits.lock() {
                Ok(mut circuits) => {
                    if let Some(until) = circuits.entry(origin.clone()).or_default().is_tripped() {
                        let remaining = until.saturating_duration_since(Instant::now());
                        return Err(TransportError::new(
                            TransportErrorKind::CircuitOpen,
                            format!(
                                "circuit breaker for {origin} is open; retry after {remaining:?}"
                            ),
                        ));
                    }
                    allow_circuit_updates = true;
                }
                Err(_) => {
                    warn!(target: "rpc", "circuit mutex poisoned; bypassing breaker pre-check");
                }
            }
        }

        // no lock held across the send
        let result = self.send_with_retries(url, body, auth, kind).await;

        if allow_circuit_updates {
            if let Ok(mut circuits) = self.circuits.lock() {
                let circuit = circuits.entry(origin.clone()).or_default();
                match &result {
                    Ok(_) => {
                        if circuit.reset() {
                            debug!(target: "rpc", origin = %origin, "circuit breaker reset");
                        }
                    }
                    // a JSON-RPC error still proves the gateway is alive
                    Err(e) if e.kind == TransportErrorKind::Rpc => {
                        circuit.reset();
                    }
                    Err(_) => {
                        if let Some(until) = circuit.record_failure(
                            self.cfg.circuit_breaker_failures,
                            self.cfg.circuit_breaker_cooldown,
                        ) {
                            warn!(
                                target: "rpc",
                                origin = %origin,
                                retry_after_ms = self.cfg.circuit_breaker_cooldown.as_millis(),
                                failures = self.cfg.circuit_breaker_failures,
                                "circuit breaker opened; suppressing requests until {:?}",
                                until
                            );
                        }
                    }
                }
            } else {
                warn!(target: "rpc", "circuit mutex poisoned; skipping circuit update");
            }
        }

        result
    }

    async fn send_with_retries(
        &self,
        url: &Url,
        body: &serde_json::Value,
        auth: Option<&HeaderValue>,
        kind: CallKind,
    ) -> Result<serde_json::Value, TransportError> {
        let total_attempts = if kind.is_idempotent() {
            self.cfg.retries.saturating_add(1)
        } else {
            1
        };
        let mut last_err: Option<TransportError> = None;

        for attempt_idx in 0..total_attempts {
            let attempt_num = attempt_idx + 1;
            let mut req = self
                .http
                .post(url.clone())
                .header(reqwest::header::ACCEPT, "application/json")
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(body);

            if let Some(hv) = auth {
                req = req.header(reqwest::header::AUTHORIZATION, hv.clone());
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let class = classify_reqwest_error(&e);
                    let backoff =
                        (attempt_num < total_attempts).then(|| compute_backoff(attempt_idx));

                    warn!(
                        target: "rpc",
                        attempt = attempt_num,
                        attempts = total_attempts,
                        error_class = class.as_str(),
                        retrying = backoff.is_some(),
                        backoff_ms = backoff.map(|d| d.as_millis()).unwrap_or(0),
                        "gateway request failed: {e}"
                    );

                    last_err = Some(TransportError::new(class, describe(&e)));

                    match backoff {
                        Some(delay) => {
                            sleep(delay).await;
                            continue;
                        }
                        None => break,
                    }
                }
            };

            let status = resp.status();
            let headers = resp.headers().clone();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let backoff = retry_backoff(attempt_idx, &headers);
                let retrying = attempt_num < total_attempts;
                warn!(
                    target: "rpc",
                    attempt = attempt_num,
                    attempts = total_attempts,
                    error_class = "http_server",
                    status = status.as_u16(),
                    retrying,
                    backoff_ms = backoff.as_millis(),
                    "gateway returned retryable status"
                );
                last_err = Some(TransportError::new(
                    TransportErrorKind::Http,
                    format!("server error {status}"),
                ));
                if retrying {
                    sleep(backoff).await;
                    continue;
                }
                break;
            }

            if !status.is_success() {
                return Err(TransportError::new(
                    TransportErrorKind::Http,
                    format!("gateway rejected request with {status}"),
                ));
            }

            let bytes = resp.bytes().await.map_err(|e| {
                TransportError::new(
                    classify_reqwest_error(&e),
                    format!("failed to read response body: {e}"),
                )
            })?;
            let mut value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Decode,
                    format!("invalid JSON response: {e}"),
                )
            })?;

            if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
                let rpc: RpcErrorBody = serde_json::from_value(err.clone()).map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Decode,
                        format!("malformed JSON-RPC error object: {e}"),
                    )
                })?;
                let meaning = json_rpc_code_meaning(rpc.code);
                let retrying = is_retryable_jsonrpc(rpc.code) && attempt_num < total_attempts;
                warn!(
                    target: "rpc",
                    attempt = attempt_num,
                    attempts = total_attempts,
                    error_class = "json_rpc",
                    code = rpc.code,
                    meaning,
                    retrying,
                    "gateway JSON-RPC error"
                );
                if retrying {
                    last_err = Some(TransportError::rpc(rpc.code, rpc.message));
                    sleep(compute_backoff(attempt_idx)).await;
                    continue;
                }
                return Err(TransportError::rpc(rpc.code, rpc.message));
            }

            let Some(result) = value.get_mut("result").map(serde_json::Value::take) else {
                return Err(TransportError::new(
                    TransportErrorKind::Decode,
                    "response carries neither result nor error",
                ));
            };

            if attempt_num > 1 {
                debug!(
                    target: "rpc",
                    attempt = attempt_num,
                    attempts = total_attempts,
                    "gateway request succeeded after retries"
                );
            }
            return Ok(result);
        }

        let err = last_err.unwrap_or_else(|| {
            TransportError::new(TransportErrorKind::Other, "request failed without error detail")
        });
        if total_attempts > 1 {
            warn!(
                target: "rpc",
                attempts = total_attempts,
                "gateway request exhausted retries: {err}"
            );
        }
        Err(err)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        agent: &Agent,
        method: &str,
        kind: CallKind,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = Self::call_url(agent, kind)?;
        let auth = Self::auth_header(agent)?;
        let request_id = next_request_id();
        let params = match args {
            serde_json::Value::Array(items) => serde_json::Value::Array(items),
            serde_json::Value::Null => json!([]),
            single => json!([single]),
        };
        let body = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
            "sender": agent.principal().as_str(),
        });
        debug!(
            target: "rpc",
            kind = kind.as_str(),
            "{}",
            rpc_context(method, &url, request_id)
        );
        self.post_json(&url, &body, auth.as_ref(), kind)
            .await
            .map_err(|mut e| {
                e.message = format!("{} ({})", e.message, rpc_context(method, &url, request_id));
                e
            })
    }
}

#[async_trait]
impl Handshake for HttpTransport {
    async fn fetch_root_key(&self, endpoint: &Url) -> Result<Vec<u8>> {
        let url = api_url(endpoint, "api/v2/status").context("building status url")?;
        let resp = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("status request to {url}"))?;
        let status = resp.status();
        ensure!(status.is_success(), "status endpoint {url} answered {status}");
        let reply: StatusReply = resp
            .json()
            .await
            .with_context(|| format!("decoding status reply from {url}"))?;
        let encoded = reply
            .root_key
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("status reply from {url} has no root_key"))?;
        let key = BASE64_STANDARD
            .decode(encoded.trim())
            .context("root_key is not valid base64")?;
        ensure!(!key.is_empty(), "root_key from {url} is empty");
        Ok(key)
    }
}

/// Folds a reqwest failure into the classes the backend layer acts on.
fn classify_reqwest_error(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_decode() || err.is_body() {
        TransportErrorKind::Decode
    } else {
        TransportErrorKind::Other
    }
}

/// `err` and its sources, joined with ": ".
fn describe(err: &reqwest::Error) -> String {
    std::iter::successors(Some(err as &dyn Error), |e| (*e).source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use muvin_types::{Identity, Principal};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CANISTER: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";

    fn test_config() -> TransportConfig {
        TransportConfig {
            http_timeout: Duration::from_millis(300),
            connect_timeout: Duration::from_millis(200),
            retries: 2,
            circuit_breaker_failures: 0,
            circuit_breaker_cooldown: Duration::from_secs(1),
        }
    }

    fn agent_for(server: &MockServer) -> Agent {
        let endpoint = Url::parse(&server.uri()).expect("endpoint");
        Agent::anonymous(CANISTER, Some(endpoint))
    }

    fn query_path() -> String {
        format!("/api/v2/canister/{CANISTER}/query")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn query_returns_result_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "getHotel",
                "params": [1],
                "sender": "2vxsx-fae"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": [42]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let value = transport
            .call(&agent_for(&server), "getHotel", CallKind::Query, json!([1]))
            .await
            .expect("call ok");
        assert_eq!(value, json!([42]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn query_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let value = transport
            .call(&agent_for(&server), "getHotels", CallKind::Query, json!([]))
            .await
            .expect("eventually ok");
        assert_eq!(value, json!([]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_is_sent_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/api/v2/canister/{CANISTER}/call")))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let err = transport
            .call(&agent_for(&server), "cancelBooking", CallKind::Update, json!([1]))
            .await
            .expect_err("500 must surface");
        assert_eq!(err.kind, TransportErrorKind::Http);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_retryable_rpc_error_surfaces_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"error": {"code": -32601, "message": "no such method"}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let err = transport
            .call(&agent_for(&server), "getNothing", CallKind::Query, json!([]))
            .await
            .expect_err("rpc error");
        assert_eq!(err.kind, TransportErrorKind::Rpc);
        assert_eq!(err.code, Some(-32601));
        assert!(err.to_string().contains("Method not found"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn delegation_travels_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
            .expect(1)
            .mount(&server)
            .await;

        let principal: Principal = "aaaaa-aa".parse().unwrap();
        let agent = agent_for(&server)
            .with_identity(Some(Identity::new(principal).with_delegation("tok-123", i64::MAX)));
        let transport = HttpTransport::new(test_config()).expect("transport");
        transport
            .call(&agent, "getMyProfile", CallKind::Query, json!([]))
            .await
            .expect("authorized call");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn circuit_opens_after_repeated_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let mut cfg = test_config();
        cfg.retries = 0;
        cfg.circuit_breaker_failures = 2;
        cfg.circuit_breaker_cooldown = Duration::from_secs(30);
        let transport = HttpTransport::new(cfg).expect("transport");
        let agent = agent_for(&server);

        for _ in 0..2 {
            let err = transport
                .call(&agent, "getHotels", CallKind::Query, json!([]))
                .await
                .unwrap_err();
            assert_eq!(err.kind, TransportErrorKind::Http);
        }
        let err = transport
            .call(&agent, "getHotels", CallKind::Query, json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::CircuitOpen);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn status_handshake_decodes_root_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "root_key": "AQID",
                "impl_version": "0.9"
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let endpoint = Url::parse(&server.uri()).unwrap();
        let key = transport.fetch_root_key(&endpoint).await.expect("root key");
        assert_eq!(key, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn status_without_root_key_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"impl_version": "0.9"})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(test_config()).expect("transport");
        let endpoint = Url::parse(&server.uri()).unwrap();
        assert!(transport.fetch_root_key(&endpoint).await.is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refused_connection_is_a_connect_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let mut cfg = test_config();
        cfg.retries = 0;
        let transport = HttpTransport::new(cfg).expect("transport");
        let agent = Agent::anonymous(CANISTER, Some(endpoint));
        let err = transport
            .call(&agent, "getHotels", CallKind::Query, json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connect);
        // the source chain carries the OS reason
        assert!(err.message.to_ascii_lowercase().contains("refused"), "{}", err.message);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn slow_gateway_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(query_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": []}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut cfg = test_config();
        cfg.retries = 0;
        let transport = HttpTransport::new(cfg).expect("transport");
        let err = transport
            .call(&agent_for(&server), "getHotels", CallKind::Query, json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }
}
