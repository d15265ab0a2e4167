//! Session ledger: the durable `user_sessions` row is authoritative, the cache
//! mirror and membership sets make the hot checks cheap.
//!
//! Cache failures never change an outcome except in `is_member`, which fails
//! closed.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use futures::future::join_all;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::store::SessionCache;
use crate::crypto::secrets::hashes_match;
use crate::error::StoreError;
use crate::models::session::{NewSession, Session};
use crate::repositories::session::{Rotation, SessionStore};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session not found")]
    NotFound,

    #[error("session is inactive or expired")]
    Inactive,

    /// The presented refresh token is not the current one for its session.
    #[error("refresh token hash mismatch")]
    HashMismatch,

    /// Another refresh rotated this session first.
    #[error("session was rotated concurrently")]
    ConcurrentRotation,
}

fn ttl_secs(session: &Session, now: i64) -> Option<u64> {
    u64::try_from(session.remaining_secs(now))
        .ok()
        .filter(|secs| *secs > 0)
}

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    cache: Arc<dyn SessionCache>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn SessionStore>, cache: Arc<dyn SessionCache>) -> Self {
        Self { store, cache }
    }

    /// Persists a new session, then mirrors it.
    ///
    /// A failed durable insert leaves nothing behind. A failed mirror write is
    /// logged and the session is returned anyway.
    pub async fn create_session(&self, new: NewSession) -> Result<Session, SessionError> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            refresh_token_id: new.refresh_token_id,
            hashed_refresh_token: new.hashed_refresh_token,
            created_at: Utc::now().trunc_subsecs(6),
            expires_at: new.expires_at,
            is_active: true,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
        };

        let session = self.store.insert(&session).await?;
        tracing::info!("✅ Session {} created for user {}", session.id, session.user_id);

        self.mirror(&session).await;
        Ok(session)
    }

    /// Writes the mirror entry and the membership, logging failures, then
    /// re-reads the durable row. A session revoked or rotated in between is
    /// taken back out of the cache. Returns whether the session is still live.
    async fn mirror(&self, session: &Session) -> bool {
        let Some(ttl) = ttl_secs(session, Utc::now().timestamp()) else {
            return false;
        };

        if let Err(e) = self.cache.put_session(session, ttl).await {
            tracing::warn!("⚠️ Failed to mirror session {}: {}", session.id, e);
        }
        if let Err(e) = self.cache.add_member(&session.user_id, &session.id, ttl).await {
            tracing::warn!(
                "⚠️ Failed to add session {} to membership of user {}: {}",
                session.id,
                session.user_id,
                e
            );
        }

        match self.store.find_by_id(&session.id).await {
            Ok(Some(current)) if current.is_usable(Utc::now().timestamp()) => {
                if current.refresh_token_id != session.refresh_token_id {
                    self.evict(session).await;
                }
                true
            }
            Ok(_) => {
                tracing::debug!("Session {} changed while mirroring, dropping it", session.id);
                self.forget(session).await;
                false
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not re-check session {}, dropping mirror: {}", session.id, e);
                self.forget(session).await;
                false
            }
        }
    }

    /// Looks a session up by refresh token id and checks the presented hash.
    pub async fn validate_and_fetch(
        &self,
        refresh_token_id: &str,
        presented_hash: &str,
    ) -> Result<Session, SessionError> {
        let now = Utc::now().timestamp();

        let cached = match self.cache.get_session(refresh_token_id).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("⚠️ Session cache read failed, using durable store: {}", e);
                None
            }
        };

        let session = match cached {
            Some(session) => session,
            None => {
                let session = self
                    .store
                    .find_by_refresh_token_id(refresh_token_id)
                    .await?
                    .ok_or(SessionError::NotFound)?;

                if let Some(ttl) = ttl_secs(&session, now).filter(|_| session.is_active) {
                    tracing::debug!("Re-populating session mirror for {}", session.id);
                    if let Err(e) = self.cache.put_session(&session, ttl).await {
                        tracing::warn!("⚠️ Failed to re-populate session {}: {}", session.id, e);
                    }
                    if !matches!(
                        self.store.find_by_refresh_token_id(refresh_token_id).await,
                        Ok(Some(ref current)) if current.is_usable(now)
                    ) {
                        self.evict(&session).await;
                    }
                }
                session
            }
        };

        if !session.is_usable(now) {
            return Err(SessionError::Inactive);
        }

        if !hashes_match(&session.hashed_refresh_token, presented_hash) {
            return Err(SessionError::HashMismatch);
        }

        Ok(session)
    }

    /// Swaps the refresh token of `session` if nobody else did first.
    pub async fn rotate(
        &self,
        session: &Session,
        new_refresh_token_id: &str,
        new_hash: &str,
        new_expires_at: i64,
    ) -> Result<Session, SessionError> {
        let rotation = Rotation {
            session_id: session.id,
            old_refresh_token_id: &session.refresh_token_id,
            old_hash: &session.hashed_refresh_token,
            new_refresh_token_id,
            new_hash,
            new_expires_at,
        };

        let Some(rotated) = self.store.rotate(&rotation).await? else {
            // The mirror of the old id may be stale now.
            if let Err(e) = self.cache.evict_session(&session.refresh_token_id).await {
                tracing::warn!("⚠️ Failed to evict stale mirror of {}: {}", session.id, e);
            }
            return Err(self.classify_lost_rotation(&session.id).await?);
        };

        tracing::info!("🔄 Session {} rotated", rotated.id);

        if let Err(e) = self.cache.evict_session(&session.refresh_token_id).await {
            tracing::warn!("⚠️ Failed to evict old mirror of {}: {}", rotated.id, e);
        }
        self.mirror(&rotated).await;

        Ok(rotated)
    }

    async fn classify_lost_rotation(&self, session_id: &Uuid) -> Result<SessionError, StoreError> {
        let now = Utc::now().timestamp();
        Ok(match self.store.find_by_id(session_id).await? {
            None => SessionError::NotFound,
            Some(current) if !current.is_usable(now) => SessionError::Inactive,
            Some(_) => SessionError::ConcurrentRotation,
        })
    }

    /// Deactivates a session and removes it from the cache. Revoking twice is fine.
    pub async fn revoke(&self, session: &Session) -> Result<(), SessionError> {
        let current = self.store.deactivate(&session.id).await?;

        self.forget(session).await;
        if let Some(current) = current
            .as_ref()
            .filter(|c| c.refresh_token_id != session.refresh_token_id)
        {
            self.forget(current).await;
        }

        tracing::info!("🚪 Session {} revoked", session.id);
        Ok(())
    }

    async fn forget(&self, session: &Session) {
        if let Err(e) = self.cache.remove_member(&session.user_id, &session.id).await {
            tracing::warn!("⚠️ Failed to remove membership of {}: {}", session.id, e);
        }
        self.evict(session).await;
    }

    async fn evict(&self, session: &Session) {
        if let Err(e) = self.cache.evict_session(&session.refresh_token_id).await {
            tracing::warn!("⚠️ Failed to evict mirror of {}: {}", session.id, e);
        }
    }

    /// Revokes the session currently holding `refresh_token_id`, if any.
    pub async fn revoke_by_refresh_token_id(
        &self,
        refresh_token_id: &str,
    ) -> Result<(), SessionError> {
        match self.store.find_by_refresh_token_id(refresh_token_id).await? {
            Some(session) => self.revoke(&session).await,
            None => Ok(()),
        }
    }

    /// Revokes one of `user_id`'s sessions. `false` if it is not theirs or not there.
    pub async fn revoke_by_id(&self, user_id: &Uuid, session_id: &Uuid) -> Result<bool, SessionError> {
        match self.store.find_by_id(session_id).await? {
            Some(session) if session.user_id == *user_id => {
                self.revoke(&session).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Revokes every active session of a user and returns how many there were.
    pub async fn revoke_all(&self, user_id: &Uuid) -> Result<usize, SessionError> {
        let revoked = self.store.deactivate_all_for_user(user_id).await?;
        join_all(revoked.iter().map(|session| self.forget(session))).await;

        tracing::info!("🚪 Revoked {} sessions of user {}", revoked.len(), user_id);
        Ok(revoked.len())
    }

    /// Whether `session_id` is a live session of `user_id`.
    ///
    /// A cache error answers `false`. A clean miss is confirmed against the
    /// durable row and re-mirrored when it turns out to be live.
    pub async fn is_member(&self, user_id: &Uuid, session_id: &Uuid) -> bool {
        match self.cache.is_member(user_id, session_id).await {
            Ok(true) => true,
            Ok(false) => self.confirm_membership(user_id, session_id).await,
            Err(e) => {
                tracing::warn!("⚠️ Membership check failed, denying: {}", e);
                false
            }
        }
    }

    async fn confirm_membership(&self, user_id: &Uuid, session_id: &Uuid) -> bool {
        let now = Utc::now().timestamp();
        match self.store.find_by_id(session_id).await {
            Ok(Some(session)) if session.user_id == *user_id && session.is_usable(now) => {
                tracing::debug!("Membership of {} restored from durable store", session.id);
                self.mirror(&session).await
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("⚠️ Durable membership check failed, denying: {}", e);
                false
            }
        }
    }

    /// Active sessions of a user, newest first.
    pub async fn list_active(&self, user_id: &Uuid) -> Result<Vec<Session>, SessionError> {
        Ok(self
            .store
            .list_active_for_user(user_id, Utc::now().timestamp())
            .await?)
    }
}
