//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use availability::LockSweeperConfig;
use saga::{ReconcilerConfig, SagaConfig};

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `LOCK_TTL_SECS`: slot lock time-to-live (default `300`)
/// - `LOCK_SWEEP_INTERVAL_SECS`: expired lock purge cadence (default `300`)
/// - `PENDING_GRACE_SECS`: age at which a `PENDING` booking is reconciled (default `900`,
///   never below the lock TTL)
/// - `RECONCILE_INTERVAL_SECS`: reconciler cadence (default `60`)
/// - `NOTIFY_TIMEOUT_MS`: cap on one notification call (default `2000`)
/// - `CATALOG_URL`: salon service base URL; empty in-memory catalog when unset
/// - `CATALOG_TIMEOUT_MS`: catalog request timeout (default `5000`)
/// - `NOTIFICATION_URL`: notification service base URL; notifications are logged when unset
///
/// Unparseable or non-positive values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    pub pending_grace: Duration,
    pub reconcile_interval: Duration,
    pub notify_timeout: Duration,
    pub catalog_url: Option<String>,
    pub catalog_timeout: Duration,
    pub notification_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| {
            parsed(key)
                .filter(|&n| n > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let millis = |key: &str, default: Duration| {
            parsed(key)
                .filter(|&n| n > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.trim().parse::<u16>().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .and_then(|f| f.parse().ok())
                .unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.trim().parse::<u32>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.database_max_connections),
            lock_ttl: secs("LOCK_TTL_SECS", defaults.lock_ttl),
            lock_sweep_interval: secs("LOCK_SWEEP_INTERVAL_SECS", defaults.lock_sweep_interval),
            pending_grace: secs("PENDING_GRACE_SECS", defaults.pending_grace),
            reconcile_interval: secs("RECONCILE_INTERVAL_SECS", defaults.reconcile_interval),
            notify_timeout: millis("NOTIFY_TIMEOUT_MS", defaults.notify_timeout),
            catalog_url: var("CATALOG_URL"),
            catalog_timeout: millis("CATALOG_TIMEOUT_MS", defaults.catalog_timeout),
            notification_url: var("NOTIFICATION_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            lock_ttl: to_chrono(self.lock_ttl),
            notify_timeout: self.notify_timeout,
        }
    }

    pub fn sweeper_config(&self) -> LockSweeperConfig {
        LockSweeperConfig {
            interval: self.lock_sweep_interval,
            enabled: true,
        }
    }

    /// The grace period never drops below the lock TTL, so a booking whose
    /// saga still holds its lock is not reconciled underneath it.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let pending_grace = if self.pending_grace < self.lock_ttl {
            tracing::warn!(
                pending_grace = ?self.pending_grace,
                lock_ttl = ?self.lock_ttl,
                "PENDING_GRACE_SECS below LOCK_TTL_SECS; using the lock TTL"
            );
            self.lock_ttl
        } else {
            self.pending_grace
        };
        ReconcilerConfig {
            interval: self.reconcile_interval,
            pending_grace: to_chrono(pending_grace),
            ..ReconcilerConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            lock_ttl: Duration::from_secs(300),
            lock_sweep_interval: Duration::from_secs(300),
            pending_grace: Duration::from_secs(900),
            reconcile_interval: Duration::from_secs(60),
            notify_timeout: Duration::from_millis(2000),
            catalog_url: None,
            catalog_timeout: Duration::from_millis(5000),
            notification_url: None,
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
