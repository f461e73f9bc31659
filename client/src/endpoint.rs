//! Gateway endpoint resolution with ordered fallback.
//!
//! Local deployments try candidates in a fixed order and settle on the
//! first one whose status handshake succeeds. If none answers the result is
//! [`Resolution::Degraded`]; resolution itself never fails.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, Deployment, LOCAL_REPLICA_PORT, PRODUCTION_HOST};
use crate::transport::Handshake;

const DEV_SERVER_LABEL: &str = "-3000.";
const REPLICA_LABEL: &str = "-4943.";

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointFailure {
    pub endpoint: Url,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Connected {
        endpoint: Url,
        /// Fetched trust root; `None` in production where it is built in.
        root_key: Option<Vec<u8>>,
    },
    Degraded {
        failures: Vec<EndpointFailure>,
    },
}

impl Resolution {
    pub fn endpoint(&self) -> Option<&Url> {
        match self {
            Resolution::Connected { endpoint, .. } => Some(endpoint),
            Resolution::Degraded { .. } => None,
        }
    }

    pub fn root_key(&self) -> Option<&[u8]> {
        match self {
            Resolution::Connected { root_key, .. } => root_key.as_deref(),
            Resolution::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded { .. })
    }
}

/// Ordered, deduplicated candidate list. The order is a preference, not a
/// reliability ranking.
pub fn candidate_endpoints(
    deployment: Deployment,
    host_override: Option<&Url>,
    origin: Option<&Url>,
) -> Vec<Url> {
    let mut out: Vec<Url> = Vec::new();
    let mut push = |url: Url| {
        if !out.iter().any(|u| u.as_str() == url.as_str()) {
            out.push(url);
        }
    };

    if let Some(url) = host_override {
        push(url.clone());
    }

    match deployment {
        Deployment::Production => {
            if host_override.is_none() {
                if let Ok(url) = Url::parse(PRODUCTION_HOST) {
                    push(url);
                }
            }
        }
        Deployment::Local => {
            if let Some(origin) = origin.and_then(origin_root) {
                // dev server proxies /api to the replica
                push(origin.clone());
                if let Some(forwarded) = forwarded_replica(&origin) {
                    push(forwarded);
                }
            }
            for host in ["127.0.0.1", "localhost"] {
                if let Ok(url) = Url::parse(&format!("http://{host}:{LOCAL_REPLICA_PORT}")) {
                    push(url);
                }
            }
        }
    }
    out
}

fn origin_root(url: &Url) -> Option<Url> {
    Url::parse(&url.origin().ascii_serialization()).ok()
}

/// Cloud IDEs expose forwarded ports as `<name>-<port>.<domain>`; the replica
/// sits beside the dev server on its own port label.
fn forwarded_replica(origin: &Url) -> Option<Url> {
    let host = origin.host_str()?;
    if !host.contains(DEV_SERVER_LABEL) {
        return None;
    }
    let mut url = origin.clone();
    url.set_host(Some(&host.replacen(DEV_SERVER_LABEL, REPLICA_LABEL, 1)))
        .ok()?;
    Some(url)
}

pub struct EndpointResolver {
    deployment: Deployment,
    candidates: Vec<Url>,
    handshake: Arc<dyn Handshake>,
}

impl EndpointResolver {
    pub fn new(cfg: &ClientConfig, handshake: Arc<dyn Handshake>) -> Self {
        Self {
            deployment: cfg.deployment,
            candidates: candidate_endpoints(
                cfg.deployment,
                cfg.host_override.as_ref(),
                cfg.origin.as_ref(),
            ),
            handshake,
        }
    }

    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    pub async fn resolve(&self) -> Resolution {
        if self.deployment == Deployment::Production {
            return match self.candidates.first() {
                Some(endpoint) => {
                    info!(target: "endpoint", endpoint = %endpoint, "using production gateway");
                    Resolution::Connected {
                        endpoint: endpoint.clone(),
                        root_key: None,
                    }
                }
                None => Resolution::Degraded { failures: vec![] },
            };
        }

        let mut failures = Vec::new();
        for (idx, candidate) in self.candidates.iter().enumerate() {
            let started = Instant::now();
            match self.handshake.fetch_root_key(candidate).await {
                Ok(root_key) => {
                    info!(
                        target: "endpoint",
                        endpoint = %candidate,
                        attempt = idx + 1,
                        candidates = self.candidates.len(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "gateway handshake succeeded"
                    );
                    return Resolution::Connected {
                        endpoint: candidate.clone(),
                        root_key: Some(root_key),
                    };
                }
                Err(err) => {
                    debug!(target: "endpoint", endpoint = %candidate, "handshake failed: {err:#}");
                    failures.push(EndpointFailure {
                        endpoint: candidate.clone(),
                        reason: format!("{err:#}"),
                    });
                }
            }
        }

        warn!(
            target: "endpoint",
            tried = failures.len(),
            "no gateway answered the status handshake; continuing degraded"
        );
        Resolution::Degraded { failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedHandshake {
        healthy: Vec<&'static str>,
        tried: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Handshake for ScriptedHandshake {
        async fn fetch_root_key(&self, endpoint: &Url) -> anyhow::Result<Vec<u8>> {
            self.tried.lock().unwrap().push(endpoint.to_string());
            if self.healthy.iter().any(|h| endpoint.as_str().starts_with(h)) {
                Ok(vec![7])
            } else {
                bail!("connection refused")
            }
        }
    }

    fn local_cfg(origin: Option<&str>) -> ClientConfig {
        let mut cfg = ClientConfig::local();
        cfg.origin = origin.map(|o| Url::parse(o).unwrap());
        cfg
    }

    #[test]
    fn local_candidates_follow_preference_order() {
        let origin = Url::parse("https://app-3000.cloud.dev/hotels?x=1").unwrap();
        let list: Vec<String> = candidate_endpoints(Deployment::Local, None, Some(&origin))
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            list,
            vec![
                "https://app-3000.cloud.dev/",
                "https://app-4943.cloud.dev/",
                "http://127.0.0.1:4943/",
                "http://localhost:4943/",
            ]
        );
    }

    #[test]
    fn override_comes_first_and_duplicates_collapse() {
        let host = Url::parse("http://127.0.0.1:4943").unwrap();
        let list = candidate_endpoints(Deployment::Local, Some(&host), None);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], host);
    }

    #[test]
    fn production_uses_mainnet_gateway() {
        let list = candidate_endpoints(Deployment::Production, None, None);
        assert_eq!(list, vec![Url::parse(PRODUCTION_HOST).unwrap()]);
    }

    #[tokio::test]
    async fn falls_through_to_first_healthy_candidate() {
        let handshake = Arc::new(ScriptedHandshake {
            healthy: vec!["http://localhost:4943"],
            tried: Mutex::new(vec![]),
        });
        let resolver =
            EndpointResolver::new(&local_cfg(Some("http://localhost:3000")), handshake.clone());
        let resolution = resolver.resolve().await;

        assert_eq!(
            resolution.endpoint().map(|u| u.as_str()),
            Some("http://localhost:4943/")
        );
        assert_eq!(resolution.root_key(), Some(&[7u8][..]));
        assert_eq!(handshake.tried.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn all_failures_degrade_instead_of_erroring() {
        let handshake = Arc::new(ScriptedHandshake {
            healthy: vec![],
            tried: Mutex::new(vec![]),
        });
        let resolver = EndpointResolver::new(&local_cfg(None), handshake);
        match resolver.resolve().await {
            Resolution::Degraded { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].reason.contains("connection refused"));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn production_skips_handshake() {
        let handshake = Arc::new(ScriptedHandshake {
            healthy: vec![],
            tried: Mutex::new(vec![]),
        });
        let mut cfg = ClientConfig::local();
        cfg.deployment = Deployment::Production;
        let resolution = EndpointResolver::new(&cfg, handshake.clone()).resolve().await;
        assert!(!resolution.is_degraded());
        assert!(resolution.root_key().is_none());
        assert!(handshake.tried.lock().unwrap().is_empty());
    }
}
