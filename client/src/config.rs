use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use url::Url;

pub const DEFAULT_CANISTER_ID: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";
pub const DEFAULT_IDENTITY_PROVIDER: &str = "https://identity.ic0.app";
pub const PRODUCTION_HOST: &str = "https://ic0.app";
pub const LOCAL_REPLICA_PORT: u16 = 4943;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Local replica; the root key must be fetched before calls verify.
    Local,
    /// Mainnet; the root key is built in and never fetched.
    Production,
}

impl Deployment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Deployment::Local => "local",
            Deployment::Production => "production",
        }
    }
}

impl FromStr for Deployment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Deployment::Local),
            "production" | "prod" | "ic" | "mainnet" => Ok(Deployment::Production),
            other => Err(format!("unknown deployment {other:?}")),
        }
    }
}

/// Client configuration. All knobs come from `MUVIN_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub canister_id: String,
    pub deployment: Deployment,
    /// Explicit gateway; tried before any derived candidate.
    pub host_override: Option<Url>,
    /// Origin the client is served from, used for same-origin proxy candidates.
    pub origin: Option<Url>,
    /// Serve fixture data when no endpoint is reachable.
    pub fixture_fallback: bool,
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper bound for one façade call, retries included.
    pub call_timeout: Duration,
    /// Extra attempts for idempotent queries. Updates never retry.
    pub retries: usize,
    pub circuit_breaker_failures: u32,
    pub circuit_breaker_cooldown: Duration,
    /// Where users complete the interactive sign-in.
    pub identity_provider: String,
    /// Where a delegation file is persisted; in-memory identities when unset.
    pub identity_path: Option<PathBuf>,
    pub login_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::local();

        let canister_id =
            env::var("MUVIN_CANISTER_ID").unwrap_or_else(|_| DEFAULT_CANISTER_ID.to_string());

        let deployment = env::var("MUVIN_DEPLOYMENT")
            .or_else(|_| env::var("NODE_ENV"))
            .ok()
            .and_then(|raw| match raw.parse::<Deployment>() {
                Ok(d) => Some(d),
                Err(err) => {
                    warn!(target: "config", "ignoring deployment setting: {err}");
                    None
                }
            })
            .unwrap_or(defaults.deployment);

        let fixture_fallback = env::var("MUVIN_FIXTURES")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let identity_provider = url_var("MUVIN_IDENTITY_PROVIDER")
            .map(|u| u.to_string())
            .unwrap_or_else(|| defaults.identity_provider.clone());

        Self {
            canister_id,
            deployment,
            host_override: url_var("MUVIN_HOST"),
            origin: url_var("MUVIN_ORIGIN"),
            fixture_fallback,
            http_timeout: millis_var("MUVIN_HTTP_TIMEOUT_MS", defaults.http_timeout),
            connect_timeout: millis_var("MUVIN_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            call_timeout: millis_var("MUVIN_CALL_TIMEOUT_MS", defaults.call_timeout),
            retries: env::var("MUVIN_RETRIES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.retries),
            circuit_breaker_failures: env::var("MUVIN_CIRCUIT_FAILURES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.circuit_breaker_failures),
            circuit_breaker_cooldown: millis_var(
                "MUVIN_CIRCUIT_COOLDOWN_MS",
                defaults.circuit_breaker_cooldown,
            ),
            identity_provider,
            identity_path: env::var("MUVIN_IDENTITY_PATH").ok().map(PathBuf::from),
            login_timeout: millis_var("MUVIN_LOGIN_TIMEOUT_MS", defaults.login_timeout),
        }
    }

    /// Local-replica defaults without consulting the environment.
    pub fn local() -> Self {
        Self {
            canister_id: DEFAULT_CANISTER_ID.to_string(),
            deployment: Deployment::Local,
            host_override: None,
            origin: None,
            fixture_fallback: true,
            http_timeout: Duration::from_millis(5_000),
            connect_timeout: Duration::from_millis(2_000),
            call_timeout: Duration::from_millis(15_000),
            retries: 2,
            circuit_breaker_failures: 5,
            circuit_breaker_cooldown: Duration::from_millis(10_000),
            identity_provider: DEFAULT_IDENTITY_PROVIDER.to_string(),
            identity_path: None,
            login_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn url_var(key: &str) -> Option<Url> {
    let raw = env::var(key).ok()?;
    match Url::parse(raw.trim()) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!(target: "config", key, value = %raw, "ignoring invalid url: {err}");
            None
        }
    }
}

fn millis_var(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment is process-global; serialize the tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "MUVIN_CANISTER_ID",
        "MUVIN_DEPLOYMENT",
        "NODE_ENV",
        "MUVIN_HOST",
        "MUVIN_ORIGIN",
        "MUVIN_FIXTURES",
        "MUVIN_RETRIES",
        "MUVIN_CALL_TIMEOUT_MS",
    ];

    fn clear() {
        for k in KEYS {
            env::remove_var(k);
        }
    }

    #[test]
    fn defaults_without_environment() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();
        let cfg = ClientConfig::from_env();
        assert_eq!(cfg.canister_id, DEFAULT_CANISTER_ID);
        assert_eq!(cfg.deployment, Deployment::Local);
        assert!(cfg.fixture_fallback);
        assert!(cfg.host_override.is_none());
        assert_eq!(cfg.identity_provider, DEFAULT_IDENTITY_PROVIDER);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear();
        env::set_var("MUVIN_CANISTER_ID", "aaaaa-aa");
        env::set_var("NODE_ENV", "production");
        env::set_var("MUVIN_HOST", "not a url");
        env::set_var("MUVIN_ORIGIN", "https://app-3000.example.dev");
        env::set_var("MUVIN_FIXTURES", "false");
        env::set_var("MUVIN_RETRIES", "many");
        env::set_var("MUVIN_CALL_TIMEOUT_MS", "250");

        let cfg = ClientConfig::from_env();
        clear();

        assert_eq!(cfg.canister_id, "aaaaa-aa");
        assert_eq!(cfg.deployment, Deployment::Production);
        assert!(cfg.host_override.is_none());
        assert_eq!(
            cfg.origin.as_ref().map(|u| u.host_str()),
            Some(Some("app-3000.example.dev"))
        );
        assert!(!cfg.fixture_fallback);
        assert_eq!(cfg.retries, ClientConfig::local().retries);
        assert_eq!(cfg.call_timeout, Duration::from_millis(250));
    }

    #[test]
    fn deployment_parses_aliases() {
        assert_eq!("PROD".parse::<Deployment>(), Ok(Deployment::Production));
        assert_eq!("development".parse::<Deployment>(), Ok(Deployment::Local));
        assert!("staging".parse::<Deployment>().is_err());
    }
}
