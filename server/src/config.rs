//! Configuration management for the server.

use std::env;
use std::time::Duration;
use tidesync_engine::{ApplyPolicy, DEFAULT_MAX_WORKERS, DEFAULT_SYNC_INTERVAL_MS};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// SQLite URL of the local replica
    pub local_database_url: String,
    /// PostgreSQL URL of the remote, authoritative replica
    pub remote_database_url: String,
    /// Shared bearer secret; when unset every request is accepted
    pub auth_secret: Option<String>,
    /// Time between scheduled passes of one session
    pub sync_interval: Duration,
    /// Entity types synced in parallel within one pass
    pub sync_workers: usize,
    /// Upper bound on one pass
    pub sync_timeout: Duration,
    pub apply_policy: ApplyPolicy,
    /// Sessions the background scheduler keeps in sync
    pub sync_sessions: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let local_database_url = env::var("LOCAL_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://tidesync.db".to_string());

        let remote_database_url =
            env::var("REMOTE_DATABASE_URL").map_err(|_| ConfigError::MissingRemoteDatabaseUrl)?;

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let sync_interval = Duration::from_secs(parse_var(
            "SYNC_INTERVAL_SECS",
            DEFAULT_SYNC_INTERVAL_MS / 1000,
        )?);
        let sync_workers = parse_var("SYNC_WORKERS", DEFAULT_MAX_WORKERS)?;
        let sync_timeout = Duration::from_secs(parse_var("SYNC_TIMEOUT_SECS", 120)?);

        if sync_interval.is_zero() {
            return Err(ConfigError::Invalid("SYNC_INTERVAL_SECS"));
        }
        if sync_workers == 0 {
            return Err(ConfigError::Invalid("SYNC_WORKERS"));
        }

        let apply_policy = match env::var("SYNC_APPLY_POLICY") {
            Ok(value) => parse_apply_policy(&value)?,
            Err(_) => ApplyPolicy::default(),
        };

        let sync_sessions = env::var("SYNC_SESSIONS")
            .map(|value| parse_sessions(&value))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            local_database_url,
            remote_database_url,
            auth_secret,
            sync_interval,
            sync_workers,
            sync_timeout,
            apply_policy,
            sync_sessions,
        })
    }

    pub fn sync_interval_ms(&self) -> u64 {
        self.sync_interval.as_millis() as u64
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn parse_apply_policy(value: &str) -> Result<ApplyPolicy, ConfigError> {
    match value.trim() {
        "fail-fast" => Ok(ApplyPolicy::FailFast),
        "continue" => Ok(ApplyPolicy::ContinueOnError),
        _ => Err(ConfigError::Invalid("SYNC_APPLY_POLICY")),
    }
}

fn parse_sessions(value: &str) -> Vec<String> {
    let mut sessions: Vec<String> = Vec::new();
    for session in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !sessions.iter().any(|s| s == session) {
            sessions.push(session.to_string());
        }
    }
    sessions
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("REMOTE_DATABASE_URL environment variable is required")]
    MissingRemoteDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    Invalid(&'static str),
}

#[cfg(test)]
impl Config {
    /// Configuration for router tests, without touching the environment.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            local_database_url: "sqlite::memory:".to_string(),
            remote_database_url: "postgres://tidesync@127.0.0.1:1/tidesync".to_string(),
            auth_secret: None,
            sync_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            sync_workers: 1,
            sync_timeout: Duration::from_secs(5),
            apply_policy: ApplyPolicy::FailFast,
            sync_sessions: Vec::new(),
        }
    }
}
