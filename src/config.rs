use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub poll_interval_secs: u64,
    pub lease_ttl_secs: u64,
    pub worker_id: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_from: String,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Base URL of the Task Broker adapter's HTTP backend (spec §4.7). When
    /// unset, the scheduler binary falls back to `NullTaskBroker`.
    pub broker_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("POLL_INTERVAL_SECS must be a valid number")?,
            lease_ttl_secs: env::var("LEASE_TTL_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("LEASE_TTL_SECS must be a valid number")?,
            worker_id: env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("scheduler-{}", uuid::Uuid::new_v4())),
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("SMTP_PORT must be a valid number")?,
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "dashboard@localhost".to_string()),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            broker_url: env::var("BROKER_URL").ok(),
        })
    }
}
