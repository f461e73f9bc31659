//! Session lifecycle: endpoint resolution, identity restore, login/logout.
//!
//! The session owns the current capability handle ([`Agent`]). Login and
//! logout build a new handle and swap it in under one lock, so readers
//! never see an identity paired with a stale handle. A logout or dispose
//! abandons any login still waiting on the identity provider.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use muvin_backend_api::Agent;
use serde::Serialize;
use tokio::sync::{watch, OnceCell};
use tracing::{info, warn};

use crate::endpoint::{EndpointResolver, Resolution};

pub mod identity;
pub use identity::{DelegationFileProvider, IdentityProvider, LoginError, MemoryIdentityProvider};

pub(crate) fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Read-only view of the session for the store and the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    /// Empty while anonymous.
    pub principal: String,
    pub endpoint: Option<String>,
    pub degraded: bool,
}

pub struct SessionManager {
    canister_id: String,
    resolver: EndpointResolver,
    provider: Arc<dyn IdentityProvider>,
    resolution: OnceCell<Resolution>,
    agent: Mutex<Agent>,
    // serializes handle swaps
    auth_lock: tokio::sync::Mutex<()>,
    // one login at a time waits on the provider
    login_lock: tokio::sync::Mutex<()>,
    // bumped by logout/dispose; a login started under an older value is void
    sign_out: watch::Sender<u64>,
}

impl SessionManager {
    pub fn new(
        canister_id: impl Into<String>,
        resolver: EndpointResolver,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let canister_id = canister_id.into();
        Self {
            agent: Mutex::new(Agent::anonymous(canister_id.clone(), None)),
            canister_id,
            resolver,
            provider,
            resolution: OnceCell::new(),
            auth_lock: tokio::sync::Mutex::new(()),
            login_lock: tokio::sync::Mutex::new(()),
            sign_out: watch::Sender::new(0),
        }
    }

    /// Idempotent; concurrent callers share one initialization. Never fails:
    /// an unreachable gateway or a broken identity store degrades to an
    /// anonymous session.
    pub async fn init(&self) -> &Resolution {
        self.resolution
            .get_or_init(|| async {
                let resolution = self.resolver.resolve().await;
                let base =
                    Agent::anonymous(self.canister_id.clone(), resolution.endpoint().cloned());

                let identity = match self.provider.restore().await {
                    Ok(Some(identity)) if identity.is_expired_at(now_ns()) => {
                        info!(
                            target: "session",
                            "persisted identity has expired; starting anonymous"
                        );
                        None
                    }
                    Ok(identity) => identity,
                    Err(err) => {
                        warn!(
                            target: "session",
                            "identity restore failed; starting anonymous: {err:#}"
                        );
                        None
                    }
                };

                let agent = base.with_identity(identity);
                info!(
                    target: "session",
                    authenticated = agent.is_authenticated(),
                    principal = %agent.principal(),
                    degraded = resolution.is_degraded(),
                    "session initialized"
                );
                self.swap_agent(agent);
                resolution
            })
            .await
    }

    /// Runs the external sign-in. `false` on cancellation or failure, with the
    /// previous session left untouched. A logout or dispose issued while the
    /// provider is still pending abandons the login, which then returns `false`.
    pub async fn login(&self) -> bool {
        self.init().await;
        let _login = self.login_lock.lock().await;
        let mut sign_out = self.sign_out.subscribe();
        let epoch = *sign_out.borrow_and_update();

        let outcome = tokio::select! {
            outcome = self.provider.login() => outcome,
            _ = sign_out.changed() => {
                info!(target: "session", "login abandoned by sign-out");
                return false;
            }
        };

        let identity = match outcome {
            Ok(identity) if identity.principal.is_anonymous() => {
                warn!(target: "session", "identity provider returned the anonymous principal");
                return false;
            }
            Ok(identity) if identity.is_expired_at(now_ns()) => {
                warn!(target: "session", "identity provider returned an expired delegation");
                return false;
            }
            Ok(identity) => identity,
            Err(LoginError::Cancelled) => {
                info!(target: "session", "login cancelled");
                return false;
            }
            Err(err) => {
                warn!(target: "session", "login failed: {err}");
                return false;
            }
        };

        let _guard = self.auth_lock.lock().await;
        if *self.sign_out.borrow() != epoch {
            info!(target: "session", "login abandoned by sign-out");
            return false;
        }
        let principal = identity.principal.clone();
        let next = self.agent().with_identity(Some(identity));
        self.swap_agent(next);
        info!(target: "session", principal = %principal, "login succeeded");
        true
    }

    /// Clears the persisted identity and drops to anonymous. Idempotent.
    pub async fn logout(&self) {
        self.init().await;
        self.sign_out.send_modify(|epoch| *epoch += 1);
        let _guard = self.auth_lock.lock().await;

        if let Err(err) = self.provider.logout().await {
            warn!(target: "session", "identity provider logout failed: {err:#}");
        }
        let next = self.agent().with_identity(None);
        self.swap_agent(next);
        info!(target: "session", "logged out");
    }

    /// Forgets the in-memory identity without touching persisted state.
    pub async fn dispose(&self) {
        self.sign_out.send_modify(|epoch| *epoch += 1);
        let _guard = self.auth_lock.lock().await;
        let next = self.agent().with_identity(None);
        self.swap_agent(next);
        info!(target: "session", "session disposed");
    }

    /// Current capability handle.
    pub fn agent(&self) -> Agent {
        match self.agent.lock() {
            Ok(agent) => agent.clone(),
            Err(poisoned) => {
                warn!(target: "session", "session mutex poisoned; reading last handle");
                poisoned.into_inner().clone()
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.agent().is_authenticated()
    }

    /// Textual principal, or an empty string while anonymous.
    pub fn principal(&self) -> String {
        let agent = self.agent();
        if agent.is_authenticated() {
            agent.principal().to_string()
        } else {
            String::new()
        }
    }

    /// `None` until `init` has completed.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.get()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let agent = self.agent();
        SessionSnapshot {
            authenticated: agent.is_authenticated(),
            principal: if agent.is_authenticated() {
                agent.principal().to_string()
            } else {
                String::new()
            },
            endpoint: agent.endpoint().map(|u| u.to_string()),
            degraded: self.resolution().map(Resolution::is_degraded).unwrap_or(true),
        }
    }

    fn swap_agent(&self, next: Agent) {
        match self.agent.lock() {
            Ok(mut slot) => *slot = next,
            Err(poisoned) => {
                warn!(target: "session", "session mutex poisoned; replacing handle anyway");
                *poisoned.into_inner() = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::transport::Handshake;
    use anyhow::bail;
    use async_trait::async_trait;
    use muvin_types::{Identity, Principal};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use url::Url;

    struct CountingHandshake {
        calls: AtomicU64,
        healthy: bool,
    }

    #[async_trait]
    impl Handshake for CountingHandshake {
        async fn fetch_root_key(&self, _endpoint: &Url) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.healthy {
                Ok(vec![1])
            } else {
                bail!("refused")
            }
        }
    }

    fn manager(
        healthy: bool,
        provider: Arc<dyn IdentityProvider>,
    ) -> (Arc<SessionManager>, Arc<CountingHandshake>) {
        let handshake = Arc::new(CountingHandshake {
            calls: AtomicU64::new(0),
            healthy,
        });
        let resolver = EndpointResolver::new(&ClientConfig::local(), handshake.clone());
        let session = SessionManager::new("rrkah-fqaaa-aaaaa-aaaaq-cai", resolver, provider);
        (Arc::new(session), handshake)
    }

    /// Sign-in that never completes, like a browser tab left open.
    struct PendingProvider;

    #[async_trait]
    impl IdentityProvider for PendingProvider {
        async fn restore(&self) -> anyhow::Result<Option<Identity>> {
            Ok(None)
        }

        async fn login(&self) -> Result<Identity, LoginError> {
            std::future::pending().await
        }

        async fn logout(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn user() -> Identity {
        Identity::new("aaaaa-aa".parse::<Principal>().unwrap())
    }

    #[tokio::test]
    async fn concurrent_init_runs_one_handshake() {
        let (session, handshake) = manager(true, Arc::new(MemoryIdentityProvider::new()));
        let (a, b, c) = tokio::join!(session.init(), session.init(), session.init());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(handshake.calls.load(Ordering::SeqCst), 1);
        assert!(!session.is_authenticated());
        assert_eq!(session.principal(), "");
    }

    #[tokio::test]
    async fn init_restores_persisted_identity() {
        let provider = MemoryIdentityProvider::new().restoring(user());
        let (session, _) = manager(true, Arc::new(provider));
        session.init().await;
        assert!(session.is_authenticated());
        assert_eq!(session.principal(), "aaaaa-aa");
    }

    #[tokio::test]
    async fn expired_identity_is_not_restored() {
        let provider = MemoryIdentityProvider::new().restoring(user().with_delegation("t", 1));
        let (session, _) = manager(true, Arc::new(provider));
        session.init().await;
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn unreachable_gateway_still_initializes() {
        let (session, _) = manager(false, Arc::new(MemoryIdentityProvider::new()));
        assert!(session.init().await.is_degraded());
        assert!(session.snapshot().degraded);
        assert!(session.agent().endpoint().is_none());
    }

    #[tokio::test]
    async fn cancelled_login_keeps_anonymous_state() {
        let (session, _) = manager(true, Arc::new(MemoryIdentityProvider::new()));
        assert!(!session.login().await);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn login_then_logout_swaps_handles() {
        let provider = Arc::new(MemoryIdentityProvider::with_identity(user()));
        let (session, _) = manager(true, provider.clone());

        assert!(session.login().await);
        let authed = session.agent();
        assert!(authed.is_authenticated());
        assert!(authed.endpoint().is_some());

        session.logout().await;
        session.logout().await;
        assert!(!session.is_authenticated());
        assert_eq!(session.agent().endpoint(), authed.endpoint());
        assert!(provider.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dispose_keeps_persisted_identity() {
        let provider = Arc::new(MemoryIdentityProvider::with_identity(user()));
        let (session, _) = manager(true, provider.clone());
        assert!(session.login().await);
        session.dispose().await;
        assert!(!session.is_authenticated());
        assert!(provider.restore().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn handshake_key_stays_on_the_resolution() {
        let (session, _) = manager(true, Arc::new(MemoryIdentityProvider::new()));
        session.init().await;
        assert_eq!(session.resolution().and_then(Resolution::root_key), Some(&[1u8][..]));
        assert!(session.agent().endpoint().is_some());
    }

    #[tokio::test]
    async fn logout_abandons_a_pending_login() {
        let (session, _) = manager(true, Arc::new(PendingProvider));
        session.init().await;
        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.login().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), session.logout())
            .await
            .expect("logout waited on the pending login");
        let logged_in = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("login kept waiting after logout")
            .unwrap();
        assert!(!logged_in);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn dispose_abandons_a_pending_login() {
        let (session, _) = manager(true, Arc::new(PendingProvider));
        session.init().await;
        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.login().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), session.dispose())
            .await
            .expect("dispose waited on the pending login");
        assert!(!pending.await.unwrap());
    }

    #[tokio::test]
    async fn login_after_logout_still_signs_in() {
        let provider = Arc::new(MemoryIdentityProvider::with_identity(user()));
        let (session, _) = manager(true, provider);
        session.logout().await;
        assert!(session.login().await);
        assert!(session.is_authenticated());
    }
}
