//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. Sensitive values wrapped in secrecy::SecretString to prevent
//! log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 7 * 24;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub notify: NotifyConfig,
    pub token_ttl: chrono::Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Settings handed to the push notifier at construction.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Base URL of the worker dispatcher. `None` disables push notification.
    pub worker_url: Option<String>,
    /// Our own externally reachable URL, sent so workers can call back.
    pub public_url: String,
    pub timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            worker_url: None,
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let timeout_ms: u64 = parsed_var("WORKER_NOTIFY_TIMEOUT_MS", DEFAULT_NOTIFY_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(Error::Config(
                "WORKER_NOTIFY_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            bind_addr: parsed_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            notify: NotifyConfig {
                worker_url: optional_var("WORKER_NOTIFY_URL")
                    .map(|url| url.trim_end_matches('/').to_string()),
                public_url: optional_var("PUBLIC_URL")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string()),
                timeout: Duration::from_millis(timeout_ms),
            },
            token_ttl: chrono::Duration::hours(parsed_var(
                "TOKEN_TTL_HOURS",
                DEFAULT_TOKEN_TTL_HOURS,
            )?),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and blank are both treated as absent.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name} ({raw}): {e}"))),
        None => Ok(default),
    }
}
