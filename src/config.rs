use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The socket address the HTTP server binds to.
    pub bind_addr: String,
    /// Path of the PEM-encoded RSA private key used to sign tokens.
    pub private_key_path: PathBuf,
    /// Path of the PEM-encoded RSA public key used to verify tokens.
    pub public_key_path: PathBuf,
    /// Lifetime of an access token in minutes.
    pub access_token_ttl_minutes: i64,
    /// Lifetime of a refresh token (and of its session) in days.
    pub refresh_token_ttl_days: i64,
    /// Requests allowed per authenticated user in one window.
    pub rate_limit_max_requests: u64,
    /// Width of the authenticated sliding window in seconds.
    pub rate_limit_window_secs: u64,
    /// Requests allowed per client IP on login/refresh in one window.
    pub auth_rate_limit_max_requests: u64,
    /// Width of the login/refresh sliding window in seconds.
    pub auth_rate_limit_window_secs: u64,
    /// Deadline for a whole request, gate included.
    pub request_timeout_ms: u64,
    /// Deadline for a single Postgres or Redis call.
    pub store_timeout_ms: u64,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// `production` turns on `Secure` cookies.
    pub app_env: String,
}

fn var_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            private_key_path: var_or("JWT_PRIVATE_KEY_PATH", "keys/jwt_private.pem")?,
            public_key_path: var_or("JWT_PUBLIC_KEY_PATH", "keys/jwt_public.pem")?,
            access_token_ttl_minutes: var_or("ACCESS_TOKEN_TTL_MINUTES", "20")?,
            refresh_token_ttl_days: var_or("REFRESH_TOKEN_TTL_DAYS", "7")?,
            rate_limit_max_requests: var_or("RATE_LIMIT_MAX_REQUESTS", "100")?,
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW_SECS", "60")?,
            auth_rate_limit_max_requests: var_or("AUTH_RATE_LIMIT_MAX_REQUESTS", "10")?,
            auth_rate_limit_window_secs: var_or("AUTH_RATE_LIMIT_WINDOW_SECS", "60")?,
            request_timeout_ms: var_or("REQUEST_TIMEOUT_MS", "30000")?,
            store_timeout_ms: var_or("STORE_TIMEOUT_MS", "2000")?,
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.access_token_ttl_minutes <= 0 {
            anyhow::bail!("ACCESS_TOKEN_TTL_MINUTES must be positive");
        }
        if self.refresh_token_ttl_days <= 0 {
            anyhow::bail!("REFRESH_TOKEN_TTL_DAYS must be positive");
        }
        if self.rate_limit_window_secs == 0 || self.auth_rate_limit_window_secs == 0 {
            anyhow::bail!("Rate limit windows must be at least one second");
        }
        if self.store_timeout_ms == 0 || self.request_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS and REQUEST_TIMEOUT_MS must be positive");
        }
        Ok(())
    }

    /// Access token lifetime.
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.access_token_ttl_minutes)
    }

    /// Refresh token lifetime.
    pub fn refresh_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_token_ttl_days)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

impl Default for Config {
    /// Defaults matching `from_env` with nothing set; `database_url` is empty.
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            private_key_path: PathBuf::from("keys/jwt_private.pem"),
            public_key_path: PathBuf::from("keys/jwt_public.pem"),
            access_token_ttl_minutes: 20,
            refresh_token_ttl_days: 7,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 60,
            auth_rate_limit_max_requests: 10,
            auth_rate_limit_window_secs: 60,
            request_timeout_ms: 30_000,
            store_timeout_ms: 2000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            app_env: "development".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.access_token_ttl(), chrono::Duration::minutes(20));
        assert_eq!(config.refresh_token_ttl(), chrono::Duration::days(7));
        assert!(!config.is_production());
    }

    #[test]
    fn validate_rejects_non_positive_ttl() {
        let config = Config {
            access_token_ttl_minutes: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let config = Config {
            store_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            request_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_window() {
        let config = Config {
            rate_limit_window_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
