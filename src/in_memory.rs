//! In-process implementations of the store seams.
//!
//! Test doubles, compiled for unit tests and with the `test-util` feature.
//! `MemoryCache::set_available(false)` makes every cache call fail the way an
//! unreachable Redis would, and `MemorySessionStore::set_lookup_delay` slows
//! down lookups by session id.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use argon2::{
    Argon2, ParamsBuilder,
    password_hash::{PasswordHasher, SaltString},
};
use async_trait::async_trait;
use rand::{RngCore, rngs::OsRng};
use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::cache::store::{SessionCache, WindowCount, WindowStore};
use crate::error::{AppError, StoreError};
use crate::models::session::Session;
use crate::models::user::User;
use crate::repositories::session::{Rotation, SessionStore};
use crate::repositories::user::UserDirectory;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 6;

/// Longest lifetime a window log is kept for.
const MAX_WINDOW_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Durable store kept in a map keyed by session id.
#[derive(Default, Clone)]
pub struct MemorySessionStore {
    rows: Arc<Mutex<HashMap<Uuid, Session>>>,
    lookup_delay_ms: Arc<AtomicU64>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `find_by_id` hand its snapshot back only after `delay`.
    pub fn set_lookup_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.lookup_delay_ms.store(millis, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<Session, StoreError> {
        let mut rows = self.rows.lock().await;
        if rows
            .values()
            .any(|row| row.refresh_token_id == session.refresh_token_id)
        {
            return Err(StoreError::Corrupt(format!(
                "duplicate refresh_token_id {}",
                session.refresh_token_id
            )));
        }
        rows.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn find_by_refresh_token_id(
        &self,
        refresh_token_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .find(|row| row.refresh_token_id == refresh_token_id)
            .cloned())
    }

    async fn find_by_id(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError> {
        let row = self.rows.lock().await.get(session_id).cloned();
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(row)
    }

    async fn rotate(&self, rotation: &Rotation<'_>) -> Result<Option<Session>, StoreError> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.get_mut(&rotation.session_id) else {
            return Ok(None);
        };

        if !row.is_active
            || row.refresh_token_id != rotation.old_refresh_token_id
            || row.hashed_refresh_token != rotation.old_hash
        {
            return Ok(None);
        }

        row.refresh_token_id = rotation.new_refresh_token_id.to_string();
        row.hashed_refresh_token = rotation.new_hash.to_string();
        row.expires_at = rotation.new_expires_at;
        Ok(Some(row.clone()))
    }

    async fn deactivate(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError> {
        let mut rows = self.rows.lock().await;
        Ok(rows.get_mut(session_id).map(|row| {
            row.is_active = false;
            row.clone()
        }))
    }

    async fn deactivate_all_for_user(&self, user_id: &Uuid) -> Result<Vec<Session>, StoreError> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .values_mut()
            .filter(|row| row.user_id == *user_id && row.is_active)
            .map(|row| {
                row.is_active = false;
                row.clone()
            })
            .collect())
    }

    async fn list_active_for_user(
        &self,
        user_id: &Uuid,
        now: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = self.rows.lock().await;
        let mut sessions: Vec<Session> = rows
            .values()
            .filter(|row| row.user_id == *user_id && row.is_usable(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[derive(Default)]
struct CacheState {
    sessions: HashMap<String, (Session, Instant)>,
    members: HashMap<Uuid, (HashSet<Uuid>, Instant)>,
    windows: HashMap<String, (BTreeMap<(i64, String), ()>, Instant)>,
}

/// Session mirror, membership sets and window logs with Redis-like expiry.
#[derive(Clone)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the cache going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drops one mirror entry, as an eviction would.
    pub async fn evict_mirror(&self, refresh_token_id: &str) {
        self.state.lock().await.sessions.remove(refresh_token_id);
    }

    /// Whether a mirror entry exists and has not expired.
    pub async fn has_mirror(&self, refresh_token_id: &str) -> bool {
        let state = self.state.lock().await;
        state
            .sessions
            .get(refresh_token_id)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    /// Drops a user's membership set.
    pub async fn clear_members(&self, user_id: &Uuid) {
        self.state.lock().await.members.remove(user_id);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("redis"))
        }
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get_session(&self, refresh_token_id: &str) -> Result<Option<Session>, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.sessions.get(refresh_token_id) {
            Some((session, expires)) if *expires > Instant::now() => Ok(Some(session.clone())),
            Some(_) => {
                state.sessions.remove(refresh_token_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError> {
        self.check()?;
        let expires = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.state
            .lock()
            .await
            .sessions
            .insert(session.refresh_token_id.clone(), (session.clone(), expires));
        Ok(())
    }

    async fn evict_session(&self, refresh_token_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.state.lock().await.sessions.remove(refresh_token_id);
        Ok(())
    }

    async fn add_member(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.check()?;
        let now = Instant::now();
        let expires = now + Duration::from_secs(ttl_secs.max(1));
        let mut state = self.state.lock().await;
        let entry = state
            .members
            .entry(*user_id)
            .or_insert_with(|| (HashSet::new(), expires));
        if entry.1 <= now {
            entry.0.clear();
        }
        entry.0.insert(*session_id);
        entry.1 = expires;
        Ok(())
    }

    async fn remove_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<(), StoreError> {
        self.check()?;
        if let Some((members, _)) = self.state.lock().await.members.get_mut(user_id) {
            members.remove(session_id);
        }
        Ok(())
    }

    async fn is_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .members
            .get(user_id)
            .is_some_and(|(members, expires)| {
                *expires > Instant::now() && members.contains(session_id)
            }))
    }
}

#[async_trait]
impl WindowStore for MemoryCache {
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: &str,
        ttl_ms: i64,
    ) -> Result<WindowCount, StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let entry = state
            .windows
            .entry(key.to_string())
            .or_insert_with(|| (BTreeMap::new(), now));
        if entry.1 <= now {
            entry.0.clear();
        }

        let window_start = now_ms.saturating_sub(window_ms);
        entry.0.retain(|(score, _), _| *score >= window_start);
        entry.0.insert((now_ms, member.to_string()), ());
        let ttl = Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)).min(MAX_WINDOW_TTL);
        entry.1 = now + ttl;

        Ok(WindowCount {
            count: entry.0.len() as u64,
            oldest_ms: entry.0.keys().next().map(|(score, _)| *score),
        })
    }
}

/// Users held in memory.
#[derive(Default, Clone)]
pub struct MemoryUserDirectory {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }

    /// Flips `is_active` on a stored user.
    pub async fn set_active(&self, user_id: &Uuid, is_active: bool) {
        if let Some(user) = self.users.lock().await.get_mut(user_id) {
            user.is_active = is_active;
        }
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }
}

/// Hashes a password with the Argon2id parameters accounts are provisioned
/// with, for seeding `MemoryUserDirectory`.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    tracing::debug!("Password hashed successfully with Argon2");
    Ok(password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_drops_entries_older_than_window() {
        let cache = MemoryCache::new();
        let first = cache.record_hit("k", 1_000, 500, "a", 1_500).await.unwrap();
        assert_eq!(first.count, 1);

        let second = cache.record_hit("k", 1_200, 500, "b", 1_500).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.oldest_ms, Some(1_000));

        let third = cache.record_hit("k", 1_600, 500, "c", 1_500).await.unwrap();
        assert_eq!(third.count, 2);
        assert_eq!(third.oldest_ms, Some(1_200));
    }

    #[tokio::test]
    async fn unavailable_cache_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set_available(false);
        assert!(matches!(
            cache.is_member(&Uuid::nil(), &Uuid::nil()).await,
            Err(StoreError::Unavailable("redis"))
        ));
        assert!(cache.record_hit("k", 1, 1, "m", 1).await.is_err());
    }
}
