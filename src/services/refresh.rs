//! Login issuance and the rotate-on-refresh protocol.
//!
//! A refresh goes `Received -> Verified -> Matched -> Rotated -> Issued` and
//! can be rejected at every step. Each refresh token is good for exactly one
//! successful rotation.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::crypto::secrets::{generate_refresh_token_id, hash_refresh_token};
use crate::error::StoreError;
use crate::models::claims::AccessClaims;
use crate::models::session::{ClientInfo, NewSession, Session};
use crate::models::user::User;
use crate::repositories::user::UserDirectory;
use crate::services::sessions::{SessionError, SessionLedger};
use crate::services::tokens::{TokenCodec, TokenError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(TokenError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("user is missing or inactive")]
    UserUnavailable,

    #[error("failed to mint tokens: {0}")]
    Minting(TokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds.
    pub access_expires_in: i64,
    /// Seconds.
    pub refresh_expires_in: i64,
}

/// A session together with the tokens that front it.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub access_claims: AccessClaims,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    codec: Arc<TokenCodec>,
    ledger: SessionLedger,
    users: Arc<dyn UserDirectory>,
}

impl RefreshCoordinator {
    pub fn new(codec: Arc<TokenCodec>, ledger: SessionLedger, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            codec,
            ledger,
            users,
        }
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            access_expires_in: self.codec.access_ttl().num_seconds(),
            refresh_expires_in: self.codec.refresh_ttl().num_seconds(),
        }
    }

    /// Starts a new session for an authenticated user.
    pub async fn issue(&self, user: &User, client: ClientInfo) -> Result<IssuedSession, RefreshError> {
        let refresh_token_id = generate_refresh_token_id();
        let refresh_claims = self.codec.refresh_claims(user.id, &refresh_token_id);
        let expires_at = refresh_claims.exp;
        let refresh_token = self
            .codec
            .sign_refresh(refresh_claims)
            .map_err(RefreshError::Minting)?;

        let session = self
            .ledger
            .create_session(NewSession {
                user_id: user.id,
                refresh_token_id,
                hashed_refresh_token: hash_refresh_token(&refresh_token),
                expires_at,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            })
            .await?;

        let access_claims = self.codec.access_claims(user, session.id);
        let access_token = self
            .codec
            .sign_access(access_claims.clone())
            .map_err(RefreshError::Minting)?;

        Ok(IssuedSession {
            tokens: self.pair(access_token, refresh_token),
            access_claims,
            session,
        })
    }

    /// Exchanges a refresh token for a new pair, rotating the session.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedSession, RefreshError> {
        let claims = self
            .codec
            .verify_refresh(presented)
            .map_err(RefreshError::InvalidRefreshToken)?;

        let presented_hash = hash_refresh_token(presented);

        let session = match self
            .ledger
            .validate_and_fetch(&claims.refresh_token_id, &presented_hash)
            .await
        {
            Ok(session) => session,
            Err(SessionError::HashMismatch) => {
                tracing::warn!(
                    "🚨 Refresh token reuse detected for user {}, revoking session",
                    claims.user_id
                );
                if let Err(e) = self
                    .ledger
                    .revoke_by_refresh_token_id(&claims.refresh_token_id)
                    .await
                {
                    tracing::error!("❌ Failed to revoke session after reuse: {}", e);
                }
                return Err(SessionError::HashMismatch.into());
            }
            Err(e) => return Err(e.into()),
        };

        if session.user_id != claims.user_id {
            tracing::warn!("Refresh token user does not own session {}", session.id);
            return Err(SessionError::NotFound.into());
        }

        let user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(RefreshError::UserUnavailable)?;

        let new_refresh_token_id = generate_refresh_token_id();
        let refresh_claims = self.codec.refresh_claims(user.id, &new_refresh_token_id);
        let new_expires_at = refresh_claims.exp;
        let refresh_token = self
            .codec
            .sign_refresh(refresh_claims)
            .map_err(RefreshError::Minting)?;
        let new_hash = hash_refresh_token(&refresh_token);

        let session = self
            .ledger
            .rotate(&session, &new_refresh_token_id, &new_hash, new_expires_at)
            .await?;

        let access_claims = self.codec.access_claims(&user, session.id);
        let access_token = self
            .codec
            .sign_access(access_claims.clone())
            .map_err(RefreshError::Minting)?;

        tracing::debug!("Issued rotated pair for session {}", session.id);

        Ok(IssuedSession {
            tokens: self.pair(access_token, refresh_token),
            access_claims,
            session,
        })
    }
}
