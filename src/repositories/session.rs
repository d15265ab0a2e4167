use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{StoreError, with_deadline};
use crate::models::session::Session;

const BACKEND: &str = "postgres";

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_id, hashed_refresh_token, created_at, \
     expires_at, is_active, ip_address, user_agent";

/// The fields a rotation swaps, guarded by the values it expects to replace.
#[derive(Debug, Clone, Copy)]
pub struct Rotation<'a> {
    pub session_id: Uuid,
    pub old_refresh_token_id: &'a str,
    pub old_hash: &'a str,
    pub new_refresh_token_id: &'a str,
    pub new_hash: &'a str,
    pub new_expires_at: i64,
}

/// The durable, authoritative session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session row and returns it as stored.
    async fn insert(&self, session: &Session) -> Result<Session, StoreError>;

    async fn find_by_refresh_token_id(
        &self,
        refresh_token_id: &str,
    ) -> Result<Option<Session>, StoreError>;

    async fn find_by_id(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError>;

    /// Compare-and-swap of the rotation fields. Returns `None` when the row no
    /// longer matches the expected id, hash or active flag.
    async fn rotate(&self, rotation: &Rotation<'_>) -> Result<Option<Session>, StoreError>;

    /// Marks a session inactive and returns the row, or `None` if it does not exist.
    async fn deactivate(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError>;

    /// Marks every active session of a user inactive and returns those rows.
    async fn deactivate_all_for_user(&self, user_id: &Uuid) -> Result<Vec<Session>, StoreError>;

    /// Active, unexpired sessions of a user, newest first.
    async fn list_active_for_user(
        &self,
        user_id: &Uuid,
        now: i64,
    ) -> Result<Vec<Session>, StoreError>;
}

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session, StoreError> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        refresh_token_id: row.try_get("refresh_token_id")?,
        hashed_refresh_token: row.try_get("hashed_refresh_token")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
    })
}

/// `user_sessions` table over a deadpool connection pool.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
    timeout: Duration,
}

impl PgSessionStore {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        with_deadline(self.timeout, BACKEND, self.pool.get()).await
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<Session, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            r#"
            INSERT INTO user_sessions
                (id, user_id, refresh_token_id, hashed_refresh_token, created_at,
                 expires_at, is_active, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let row = with_deadline(
            self.timeout,
            BACKEND,
            client.query_one(
                &stmt,
                &[
                    &session.id,
                    &session.user_id,
                    &session.refresh_token_id,
                    &session.hashed_refresh_token,
                    &session.created_at,
                    &session.expires_at,
                    &session.is_active,
                    &session.ip_address,
                    &session.user_agent,
                ],
            ),
        )
        .await?;

        row_to_session(&row)
    }

    async fn find_by_refresh_token_id(
        &self,
        refresh_token_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM user_sessions WHERE refresh_token_id = $1",
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let row = with_deadline(
            self.timeout,
            BACKEND,
            client.query_opt(&stmt, &[&refresh_token_id]),
        )
        .await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn find_by_id(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM user_sessions WHERE id = $1", SESSION_COLUMNS);
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let row =
            with_deadline(self.timeout, BACKEND, client.query_opt(&stmt, &[session_id])).await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn rotate(&self, rotation: &Rotation<'_>) -> Result<Option<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            r#"
            UPDATE user_sessions
            SET refresh_token_id = $1,
                hashed_refresh_token = $2,
                expires_at = $3
            WHERE id = $4
              AND refresh_token_id = $5
              AND hashed_refresh_token = $6
              AND is_active = true
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let row = with_deadline(
            self.timeout,
            BACKEND,
            client.query_opt(
                &stmt,
                &[
                    &rotation.new_refresh_token_id,
                    &rotation.new_hash,
                    &rotation.new_expires_at,
                    &rotation.session_id,
                    &rotation.old_refresh_token_id,
                    &rotation.old_hash,
                ],
            ),
        )
        .await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn deactivate(&self, session_id: &Uuid) -> Result<Option<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "UPDATE user_sessions SET is_active = false WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let row =
            with_deadline(self.timeout, BACKEND, client.query_opt(&stmt, &[session_id])).await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn deactivate_all_for_user(&self, user_id: &Uuid) -> Result<Vec<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            r#"
            UPDATE user_sessions
            SET is_active = false
            WHERE user_id = $1 AND is_active = true
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let rows = with_deadline(self.timeout, BACKEND, client.query(&stmt, &[user_id])).await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn list_active_for_user(
        &self,
        user_id: &Uuid,
        now: i64,
    ) -> Result<Vec<Session>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            r#"
            SELECT {}
            FROM user_sessions
            WHERE user_id = $1 AND is_active = true AND expires_at > $2
            ORDER BY created_at DESC
            "#,
            SESSION_COLUMNS
        );
        let stmt = with_deadline(self.timeout, BACKEND, client.prepare_cached(&sql)).await?;

        let rows =
            with_deadline(self.timeout, BACKEND, client.query(&stmt, &[user_id, &now])).await?;

        rows.iter().map(row_to_session).collect()
    }
}
