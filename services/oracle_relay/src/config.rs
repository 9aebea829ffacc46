//! Relay configuration, read once from the environment at start-up.

use oracle_adapter::OriginConfig;
use oracle_ledger::AccountId;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub origin_url: String,
    pub origin_user: String,
    pub origin_password: String,
    /// Accept invalid origin TLS certificates. Off unless explicitly enabled.
    pub insecure_tls: bool,
    pub relay_account: AccountId,
    pub workers: usize,
    pub queue_depth: usize,
    pub dispatch_timeout: Duration,
    pub write_timeout: Duration,
    pub write_attempts: u32,
    pub write_backoff: Duration,
    pub journal_path: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".into(),
            origin_url: "https://localhost:4433".into(),
            origin_user: "admin".into(),
            origin_password: "admin".into(),
            insecure_tls: false,
            relay_account: AccountId::new("relay"),
            workers: 4,
            queue_depth: 256,
            dispatch_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            write_attempts: 3,
            write_backoff: Duration::from_millis(250),
            journal_path: None,
            metrics_addr: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.parse().ok())
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            listen_addr: env_or("ORACLE_LISTEN_ADDR", d.listen_addr),
            origin_url: env_or("ORACLE_ORIGIN_URL", d.origin_url),
            origin_user: env_or("ORACLE_ORIGIN_USER", d.origin_user),
            origin_password: env_or("ORACLE_ORIGIN_PASSWORD", d.origin_password),
            insecure_tls: env_flag("ORACLE_INSECURE_TLS"),
            relay_account: AccountId::new(env_or(
                "ORACLE_RELAY_ACCOUNT",
                d.relay_account.to_string(),
            )),
            workers: env_or("ORACLE_WORKERS", d.workers).max(1),
            queue_depth: env_or("ORACLE_QUEUE_DEPTH", d.queue_depth).max(1),
            dispatch_timeout: Duration::from_secs(env_or(
                "ORACLE_DISPATCH_TIMEOUT_SECS",
                d.dispatch_timeout.as_secs(),
            )),
            write_timeout: Duration::from_secs(env_or(
                "ORACLE_WRITE_TIMEOUT_SECS",
                d.write_timeout.as_secs(),
            )),
            write_attempts: env_or("ORACLE_WRITE_ATTEMPTS", d.write_attempts).max(1),
            write_backoff: d.write_backoff,
            journal_path: env_opt("ORACLE_JOURNAL_PATH"),
            metrics_addr: env_opt("ORACLE_METRICS_ADDR"),
        }
    }

    pub fn origin(&self) -> OriginConfig {
        OriginConfig {
            base_url: self.origin_url.clone(),
            username: self.origin_user.clone(),
            password: self.origin_password.clone(),
            accept_invalid_certs: self.insecure_tls,
            timeout_ms: self.dispatch_timeout.as_millis() as u64,
        }
    }
}
