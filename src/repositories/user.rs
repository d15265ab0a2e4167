use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{StoreError, with_deadline};
use crate::models::user::User;

const BACKEND: &str = "postgres";

/// Read access to the accounts a session can belong to.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<User>, StoreError>;
}

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password: row.try_get("password")?,
        is_active: row.try_get("is_active")?,
    })
}

/// `users` table over a deadpool connection pool.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: Pool,
    timeout: Duration,
}

impl PgUserDirectory {
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    /// Finds a user by their username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let client = with_deadline(self.timeout, BACKEND, self.pool.get()).await?;
        let stmt = with_deadline(
            self.timeout,
            BACKEND,
            client.prepare_cached(
                r#"
                SELECT id, full_name, username, email, password, is_active
                FROM users
                WHERE username = $1
                "#,
            ),
        )
        .await?;

        let row = with_deadline(self.timeout, BACKEND, client.query_opt(&stmt, &[&username])).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Finds a user by their ID.
    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<User>, StoreError> {
        let client = with_deadline(self.timeout, BACKEND, self.pool.get()).await?;
        let stmt = with_deadline(
            self.timeout,
            BACKEND,
            client.prepare_cached(
                r#"
                SELECT id, full_name, username, email, password, is_active
                FROM users
                WHERE id = $1
                "#,
            ),
        )
        .await?;

        let row = with_deadline(self.timeout, BACKEND, client.query_opt(&stmt, &[user_id])).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }
}
