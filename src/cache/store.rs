//! Seams over the atomic cache store.
//!
//! `SessionCache` backs the session mirror and the per-user membership sets,
//! `WindowStore` backs the sliding-window rate counters. Both are advisory:
//! callers decide what a failure means.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::session::Session;

/// Key of the mirrored session for a refresh token id.
pub fn refresh_token_key(refresh_token_id: &str) -> String {
    format!("refresh_token:{}", refresh_token_id)
}

/// Key of the set of active session ids of a user.
pub fn user_session_key(user_id: &Uuid) -> String {
    format!("user_session:{}", user_id)
}

/// Key of a sliding-window log.
pub fn rate_limit_key(prefix: &str, identifier: &str) -> String {
    format!("{}:{}", prefix, identifier)
}

/// Fast-path mirror of durable sessions.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Reads the mirrored session. `Ok(None)` is a clean miss.
    async fn get_session(&self, refresh_token_id: &str) -> Result<Option<Session>, StoreError>;

    /// Writes the mirror for `session.refresh_token_id` with a TTL in seconds.
    async fn put_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError>;

    /// Deletes a mirror entry. Deleting a missing entry succeeds.
    async fn evict_session(&self, refresh_token_id: &str) -> Result<(), StoreError>;

    /// Adds a session to the user's membership set and refreshes the set TTL.
    async fn add_member(
        &self,
        user_id: &Uuid,
        session_id: &Uuid,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Removes a session from the user's membership set.
    async fn remove_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<(), StoreError>;

    /// Checks set membership.
    async fn is_member(&self, user_id: &Uuid, session_id: &Uuid) -> Result<bool, StoreError>;
}

/// Result of recording one hit in a sliding-window log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Entries inside the window, the new one included.
    pub count: u64,
    /// Score (epoch milliseconds) of the oldest entry still in the window.
    pub oldest_ms: Option<i64>,
}

/// Storage for sliding-window logs.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// In one atomic unit: drops entries scored before `now_ms - window_ms`,
    /// adds `member` at `now_ms`, counts the log and sets its expiry to `ttl_ms`.
    async fn record_hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        member: &str,
        ttl_ms: i64,
    ) -> Result<WindowCount, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_documented_layout() {
        let user_id = Uuid::nil();
        assert_eq!(refresh_token_key("abc"), "refresh_token:abc");
        assert_eq!(
            user_session_key(&user_id),
            "user_session:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(rate_limit_key("rate_limit:api", "42"), "rate_limit:api:42");
    }
}
