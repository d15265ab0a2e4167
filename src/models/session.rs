use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user session.
///
/// The durable row is authoritative; the Redis mirror stores this same struct
/// as JSON under `refresh_token:{refresh_token_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The session's surrogate key. Access tokens carry it as `session_id`.
    pub id: Uuid,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// Opaque id of the current refresh token. Changes on every rotation.
    pub refresh_token_id: String,
    /// SHA-256 of the current refresh token. The raw token is never stored.
    pub hashed_refresh_token: String,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Expiry as epoch seconds.
    pub expires_at: i64,
    /// `false` is terminal.
    pub is_active: bool,
    /// Client address at login.
    pub ip_address: Option<String>,
    /// Client user agent at login.
    pub user_agent: Option<String>,
}

impl Session {
    /// Seconds left before `expires_at`, negative once expired.
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// Active and not yet expired.
    pub fn is_usable(&self, now: i64) -> bool {
        self.is_active && self.remaining_secs(now) > 0
    }
}

/// Input for `SessionLedger::create_session`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub refresh_token_id: String,
    pub hashed_refresh_token: String,
    pub expires_at: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// What the ledger knows about the caller at login.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
