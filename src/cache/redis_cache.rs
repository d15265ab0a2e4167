use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::cache::store::{
    SessionCache, WindowCount, WindowStore, refresh_token_key, user_session_key,
};
use crate::error::{StoreError, with_deadline};
use crate::models::session::Session;

const BACKEND: &str = "redis";

/// Redis-backed session mirror and rate-counter store.
///
/// Every command runs under the configured store timeout.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager, timeout: Duration) -> Self {
        Self { conn, timeout }
    }
}

#[async_trait]
impl SessionCache for RedisCache {
    async fn get_session(&self, refresh_token_id: &str) -> Result<Option<Session>, StoreError> {
        let mut conn = self.conn.clone();
        let key = refresh_token_key(refresh_token_id);

        let raw: Option<String> = with_deadline(self.timeout, BACKEND, conn.get(&key)).await?;

        raw.map(|json| {
            sonic_rs::from_str::<Session>(&json)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))
        })
        .transpose()
    }

    async fn put_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = refresh_token_key(&session.refresh_token_id);
        let json = sonic_rs::to_string(session)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))?;

        let _: () =
            with_deadline(self.timeout, BACKEND, conn.set_ex(&key, json, ttl_secs.max(1))).await?;

        tracing::debug!("Session mirrored at {}", key);
        Ok(())
    }

    async fn evict_session(&self, refresh_token_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = refresh_token_key(refresh_token_id);

        let _: () = with_deadline(self.timeout, BACKEND, conn.del(&key)).await?;
        Ok(())
    }

    async fn add_member(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = user_session_key(user_id);
        let ttl = i64::try_from(ttl_secs.max(1)).unwrap_or(i64::MAX);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(&key, session_id.to_string())
            .ignore()
            .expire(&key, ttl)
            .ignore();

        let _: () = with_deadline(self.timeout, BACKEND, pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn remove_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = user_session_key(user_id);

        let _: () =
            with_deadline(self.timeout, BACKEND, conn.srem(&key, session_id.to_string())).await?;
        Ok(())
    }

    async fn is_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = user_session_key(user_id);

        let member: bool =
            with_deadline(self.timeout, BACKEND, conn.sismember(&key, session_id.to_string()))
                .await?;
        Ok(member)
    }
}

#[async_trait]
impl WindowStore for RedisCache {
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: &str,
        ttl_ms: i64,
    ) -> Result<WindowCount, StoreError> {
        let mut conn = self.conn.clone();
        let window_start = now_ms.saturating_sub(window_ms);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrembyscore(key, "-inf", format!("({}", window_start))
            .ignore()
            .zadd(key, member, now_ms)
            .ignore()
            .zcard(key)
            .zrange_withscores(key, 0, 0)
            .pexpire(key, ttl_ms)
            .ignore();

        let (count, oldest): (u64, Vec<(String, f64)>) =
            with_deadline(self.timeout, BACKEND, pipe.query_async(&mut conn)).await?;

        Ok(WindowCount {
            count,
            oldest_ms: oldest.first().map(|(_, score)| *score as i64),
        })
    }
}
