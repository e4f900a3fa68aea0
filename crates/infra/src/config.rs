//! Environment configuration.
//!
//! The core treats these as passed-in values; nothing else in the
//! workspace reads the environment.

use std::time::Duration;

use ledgerd_core::{LedgerError, LedgerResult};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub env: String,

    pub database_url: String,
    pub database_max_connections: u32,
    pub database_max_idle_time: Duration,

    /// Hard deadline for one outbound webhook POST.
    pub webhook_timeout: Duration,
    /// Default max_attempts stamped on new delivery rows.
    pub webhook_max_retries: i32,
    /// Delivery worker tick.
    pub webhook_poll_interval: Duration,
    /// Due rows fetched per worker pass.
    pub webhook_batch_size: i64,
}

impl Config {
    pub fn from_env() -> LedgerResult<Self> {
        Ok(Self {
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8080)?,
            env: env_string("ENV", "development"),

            database_url: env_string(
                "DATABASE_URL",
                "postgres://localhost/ledger_dev?sslmode=disable",
            ),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 25)?,
            database_max_idle_time: Duration::from_secs(env_parse(
                "DATABASE_MAX_IDLE_TIME",
                15 * 60,
            )?),

            webhook_timeout: Duration::from_secs(env_parse("WEBHOOK_TIMEOUT", 30)?),
            webhook_max_retries: env_parse("WEBHOOK_MAX_RETRIES", 3)?,
            webhook_poll_interval: Duration::from_secs(env_parse("WEBHOOK_POLL_INTERVAL", 10)?),
            webhook_batch_size: env_parse("WEBHOOK_BATCH_SIZE", 10)?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> LedgerResult<T> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|_| LedgerError::validation(format!("invalid value for {key}: {v:?}"))),
        _ => Ok(default),
    }
}
