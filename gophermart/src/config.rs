//! Service configuration
//!
//! Flags win over environment variables, which win over defaults. `.env` is
//! loaded before parsing.

use clap::Parser;

use crate::error::BoxError;

#[derive(Debug, Clone, Parser)]
#[command(name = "gophermart", version, about = "Loyalty points service")]
pub struct Config {
    /// HTTP listen address
    #[arg(short = 'a', long, env = "RUN_ADDRESS", default_value = "localhost:8080")]
    pub run_address: String,

    /// PostgreSQL connection URL
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub database_uri: String,

    /// Base URL of the accrual service
    #[arg(
        short = 'r',
        long,
        env = "ACCRUAL_SYSTEM_ADDRESS",
        default_value = "http://localhost:8081"
    )]
    pub accrual_system_address: String,

    /// development | staging | production
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,

    #[arg(long, env = "ACCRUAL_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub accrual_poll_interval_secs: u64,

    #[arg(long, env = "ACCRUAL_REQUEST_TIMEOUT_SECS", default_value_t = 5)]
    pub accrual_request_timeout_secs: u64,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// JWT signing secret (env: JWT_SECRET)
    #[arg(skip)]
    pub jwt_secret: String,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Parse flags and environment
    pub fn load() -> Result<Self, BoxError> {
        Self::parse().finish()
    }

    fn finish(mut self) -> Result<Self, BoxError> {
        self.accrual_system_address = normalize_base_url(&self.accrual_system_address);
        self.jwt_secret = Self::require_secret("JWT_SECRET", &self.environment)?;
        if self.accrual_poll_interval_secs == 0 {
            return Err("ACCRUAL_POLL_INTERVAL_SECS must be positive".into());
        }
        Ok(self)
    }
}

/// `localhost:8081/` -> `http://localhost:8081`
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
