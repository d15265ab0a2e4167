use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::keys::SigningKeys;
use crate::models::claims::{AccessClaims, RefreshClaims, TokenClaims, TokenType};
use crate::models::user::User;

/// Why a token was not accepted. Every variant means "re-authenticate".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("expected a {expected} token, got {found}")]
    WrongTokenType {
        expected: TokenType,
        found: TokenType,
    },

    #[error("token is malformed")]
    Malformed,

    /// Signing failed. This is a server fault, not a client one.
    #[error("failed to sign token: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::InvalidSignature
            }
            _ => TokenError::Malformed,
        }
    }
}

/// Signs and verifies access and refresh tokens with the RS256 keypair.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    keys: SigningKeys,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(keys: SigningKeys, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            keys,
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Signs a set of claims.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, self.keys.encoding())
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verifies signature and expiry, then checks the token type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims, TokenError> {
        let data =
            jsonwebtoken::decode::<TokenClaims>(token, self.keys.decoding(), &self.validation)?;

        let found = data.claims.token_type();
        if found != expected {
            return Err(TokenError::WrongTokenType { expected, found });
        }

        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        match self.verify(token, TokenType::Access)? {
            TokenClaims::Access(claims) => Ok(claims),
            TokenClaims::Refresh(_) => Err(TokenError::Malformed),
        }
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        match self.verify(token, TokenType::Refresh)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            TokenClaims::Access(_) => Err(TokenError::Malformed),
        }
    }

    /// Access claims for a user's session, expiring `access_ttl` from now.
    pub fn access_claims(&self, user: &User, session_id: Uuid) -> AccessClaims {
        let now = Utc::now();
        AccessClaims {
            user_id: user.id,
            session_id,
            email: user.email.clone(),
            username: Some(user.username.clone()),
            full_name: Some(user.full_name.clone()),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Refresh claims for a new refresh token id, expiring `refresh_ttl` from now.
    pub fn refresh_claims(&self, user_id: Uuid, refresh_token_id: &str) -> RefreshClaims {
        let now = Utc::now();
        RefreshClaims {
            user_id,
            refresh_token_id: refresh_token_id.to_string(),
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn sign_access(&self, claims: AccessClaims) -> Result<String, TokenError> {
        self.sign(&TokenClaims::Access(claims))
    }

    pub fn sign_refresh(&self, claims: RefreshClaims) -> Result<String, TokenError> {
        self.sign(&TokenClaims::Refresh(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/jwt_private.pem");
    const PUBLIC: &[u8] = include_bytes!("../../tests/fixtures/jwt_public.pem");
    const OTHER_PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/other_private.pem");

    fn codec() -> TokenCodec {
        let keys = SigningKeys::from_pem(PRIVATE, PUBLIC).unwrap();
        TokenCodec::new(keys, Duration::minutes(20), Duration::days(7))
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            full_name: "Ana Souza".to_string(),
            username: "ana".to_string(),
            email: Some("ana@example.org".to_string()),
            password: String::new(),
            is_active: true,
        }
    }

    #[test]
    fn access_token_round_trips() {
        let codec = codec();
        let user = user();
        let session_id = Uuid::new_v4();
        let claims = codec.access_claims(&user, session_id);

        let token = codec.sign_access(claims.clone()).unwrap();
        let decoded = codec.verify_access(&token).unwrap();

        assert_eq!(decoded, claims);
        assert_eq!(decoded.exp - decoded.iat, 20 * 60);
    }

    #[test]
    fn refresh_token_has_its_own_ttl() {
        let codec = codec();
        let claims = codec.refresh_claims(Uuid::new_v4(), "rt-1");
        let token = codec.sign_refresh(claims).unwrap();

        let decoded = codec.verify_refresh(&token).unwrap();
        assert_eq!(decoded.refresh_token_id, "rt-1");
        assert_eq!(decoded.exp - decoded.iat, 7 * 24 * 3600);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let codec = codec();
        let token = codec
            .sign_refresh(codec.refresh_claims(Uuid::new_v4(), "rt-1"))
            .unwrap();

        assert_eq!(
            codec.verify_access(&token).unwrap_err(),
            TokenError::WrongTokenType {
                expected: TokenType::Access,
                found: TokenType::Refresh,
            }
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec();
        let mut claims = codec.access_claims(&user(), Uuid::new_v4());
        claims.iat -= 3600;
        claims.exp = Utc::now().timestamp() - 5;
        let token = codec.sign_access(claims).unwrap();

        assert_eq!(codec.verify_access(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let foreign = {
            let keys = SigningKeys::from_pem(PRIVATE, PUBLIC).unwrap();
            let other = jsonwebtoken::EncodingKey::from_rsa_pem(OTHER_PRIVATE).unwrap();
            let codec = TokenCodec::new(keys, Duration::minutes(20), Duration::days(7));
            let claims = TokenClaims::Access(codec.access_claims(&user(), Uuid::new_v4()));
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &other).unwrap()
        };

        assert_eq!(
            codec().verify_access(&foreign).unwrap_err(),
            TokenError::InvalidSignature
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            codec().verify_access("not.a.jwt").unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(codec().verify_access("").unwrap_err(), TokenError::Malformed);
    }
}
