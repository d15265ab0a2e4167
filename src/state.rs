use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::cache::redis_cache::RedisCache;
use crate::cache::store::{SessionCache, WindowStore};
use crate::config::Config;
use crate::crypto::keys::SigningKeys;
use crate::error::{AppError, Result};
use crate::repositories::session::{PgSessionStore, SessionStore};
use crate::repositories::user::{PgUserDirectory, UserDirectory};
use crate::services::rate_limiter::RateLimiter;
use crate::services::refresh::RefreshCoordinator;
use crate::services::sessions::SessionLedger;
use crate::services::tokens::TokenCodec;

/// Key prefix of the per-user limiter on authenticated routes.
pub const API_RATE_LIMIT_PREFIX: &str = "rate_limit:api";
/// Key prefix of the per-IP limiter on login and refresh.
pub const AUTH_RATE_LIMIT_PREFIX: &str = "rate_limit:auth";

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Token signing and verification.
    pub codec: Arc<TokenCodec>,
    /// The session ledger.
    pub ledger: SessionLedger,
    /// Login issuance and refresh rotation.
    pub coordinator: RefreshCoordinator,
    /// Account lookups for login and refresh.
    pub users: Arc<dyn UserDirectory>,
    /// Per-user limiter used by the request gate.
    pub api_limiter: RateLimiter,
    /// Per-IP limiter on login and refresh.
    pub auth_limiter: RateLimiter,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL and Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    /// * `keys` - The loaded signing keypair.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config, keys: SigningKeys) -> Result<Self> {
        let store_timeout = config.store_timeout();

        let pool = crate::db::create_pool(&config.database_url, store_timeout)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| AppError::Internal(format!("Invalid REDIS_URL: {}", e)))?;
        let redis = ConnectionManager::new(redis_client)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection failed: {}", e)))?;
        tracing::info!("✅ Redis Connection Manager initialized");

        let cache = Arc::new(RedisCache::new(redis, store_timeout));

        Ok(Self::from_parts(
            config.clone(),
            keys,
            Arc::new(PgSessionStore::new(pool.clone(), store_timeout)),
            cache.clone(),
            cache,
            Arc::new(PgUserDirectory::new(pool, store_timeout)),
        ))
    }

    /// Wires the state from explicit store implementations.
    pub fn from_parts(
        config: Config,
        keys: SigningKeys,
        sessions: Arc<dyn SessionStore>,
        session_cache: Arc<dyn SessionCache>,
        windows: Arc<dyn WindowStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let codec = Arc::new(TokenCodec::new(
            keys,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        ));
        let ledger = SessionLedger::new(sessions, session_cache);
        let coordinator = RefreshCoordinator::new(codec.clone(), ledger.clone(), users.clone());

        let api_limiter = RateLimiter::new(
            windows.clone(),
            API_RATE_LIMIT_PREFIX,
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        let auth_limiter = RateLimiter::new(
            windows,
            AUTH_RATE_LIMIT_PREFIX,
            config.auth_rate_limit_max_requests,
            Duration::from_secs(config.auth_rate_limit_window_secs),
        );
        tracing::info!(
            "✅ Rate limiters initialized ({} per {}s per user, {} per {}s per IP on auth)",
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
            config.auth_rate_limit_max_requests,
            config.auth_rate_limit_window_secs
        );

        Self {
            config: Arc::new(config),
            codec,
            ledger,
            coordinator,
            users,
            api_limiter,
            auth_limiter,
        }
    }
}
