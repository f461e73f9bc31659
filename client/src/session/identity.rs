use std::collections::VecDeque;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use muvin_types::Identity;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::now_ns;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoginError {
    #[error("login was cancelled")]
    Cancelled,
    #[error("login failed: {0}")]
    Failed(String),
}

/// External identity boundary. `login` may suspend until an out-of-band
/// sign-in flow completes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// A previously persisted identity, if any. Expiry is checked by the caller.
    async fn restore(&self) -> Result<Option<Identity>>;
    async fn login(&self) -> Result<Identity, LoginError>;
    async fn logout(&self) -> Result<()>;
}

/// In-memory provider with scripted login outcomes.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    stored: Mutex<Option<Identity>>,
    outcomes: Mutex<VecDeque<Result<Identity, LoginError>>>,
    fallback: Option<Identity>,
    logins: AtomicU64,
}

impl MemoryIdentityProvider {
    /// Every login is cancelled unless an outcome is queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every login succeeds with `identity` unless an outcome is queued.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            fallback: Some(identity),
            ..Self::default()
        }
    }

    /// Pretend `identity` was persisted by an earlier session.
    pub fn restoring(self, identity: Identity) -> Self {
        if let Ok(mut slot) = self.stored.lock() {
            *slot = Some(identity);
        }
        self
    }

    pub fn push_outcome(&self, outcome: Result<Identity, LoginError>) {
        if let Ok(mut q) = self.outcomes.lock() {
            q.push_back(outcome);
        }
    }

    pub fn login_attempts(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn restore(&self) -> Result<Option<Identity>> {
        Ok(self.stored.lock().map(|s| s.clone()).unwrap_or(None))
    }

    async fn login(&self) -> Result<Identity, LoginError> {
        self.logins.fetch_add(1, Ordering::Relaxed);
        let queued = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        let outcome = queued.unwrap_or_else(|| self.fallback.clone().ok_or(LoginError::Cancelled));
        if let Ok(identity) = &outcome {
            if let Ok(mut slot) = self.stored.lock() {
                *slot = Some(identity.clone());
            }
        }
        outcome
    }

    async fn logout(&self) -> Result<()> {
        if let Ok(mut slot) = self.stored.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Persists the identity as a JSON delegation file.
///
/// `login` does not drive the interactive flow itself: it points the user at
/// the identity provider and waits for that flow to drop a fresh, unexpired
/// delegation at `path`.
pub struct DelegationFileProvider {
    path: PathBuf,
    identity_provider: String,
    login_timeout: Duration,
    poll_interval: Duration,
}

impl DelegationFileProvider {
    pub fn new(
        path: impl Into<PathBuf>,
        identity_provider: impl Into<String>,
        login_timeout: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            identity_provider: identity_provider.into(),
            login_timeout,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `identity` where `login` and `restore` will find it.
    pub async fn store(&self, identity: &Identity) -> Result<()> {
        let body = serde_json::to_vec_pretty(identity).context("encoding delegation")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing delegation to {}", self.path.display()))
    }

    async fn read_unexpired(&self) -> Result<Option<Identity>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let identity: Identity = serde_json::from_slice(&raw)
            .with_context(|| format!("decoding delegation at {}", self.path.display()))?;
        if identity.is_expired_at(now_ns()) {
            debug!(
                target: "session",
                path = %self.path.display(),
                "delegation on disk has expired"
            );
            return Ok(None);
        }
        Ok(Some(identity))
    }
}

#[async_trait]
impl IdentityProvider for DelegationFileProvider {
    async fn restore(&self) -> Result<Option<Identity>> {
        self.read_unexpired().await
    }

    async fn login(&self) -> Result<Identity, LoginError> {
        info!(
            target: "session",
            identity_provider = %self.identity_provider,
            path = %self.path.display(),
            timeout_s = self.login_timeout.as_secs(),
            "waiting for sign-in to complete"
        );
        let deadline = Instant::now() + self.login_timeout;
        loop {
            match self.read_unexpired().await {
                Ok(Some(identity)) => return Ok(identity),
                Ok(None) => {}
                Err(err) => warn!(target: "session", "ignoring unreadable delegation: {err:#}"),
            }
            if Instant::now() >= deadline {
                return Err(LoginError::Cancelled);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn logout(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}
