use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminates access tokens from refresh tokens on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by a short-lived access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: Uuid,
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Claims carried by a long-lived refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: Uuid,
    pub refresh_token_id: String,
    pub exp: i64,
    pub iat: i64,
}

/// A decoded token, tagged by its `token_type` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "token_type", rename_all = "lowercase")]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

impl TokenClaims {
    pub fn token_type(&self) -> TokenType {
        match self {
            TokenClaims::Access(_) => TokenType::Access,
            TokenClaims::Refresh(_) => TokenType::Refresh,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_claims_serialize_with_discriminator() {
        let claims = TokenClaims::Access(AccessClaims {
            user_id: Uuid::nil(),
            session_id: Uuid::nil(),
            email: None,
            username: Some("ana".to_string()),
            full_name: None,
            exp: 20,
            iat: 10,
        });

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["token_type"], "access");
        assert_eq!(json["username"], "ana");
        assert!(json.get("email").is_none());
        assert!(json.get("refresh_token_id").is_none());
    }

    #[test]
    fn refresh_claims_round_trip_through_tag() {
        let json = serde_json::json!({
            "token_type": "refresh",
            "user_id": Uuid::nil(),
            "refresh_token_id": "abc",
            "exp": 20,
            "iat": 10
        });

        let claims: TokenClaims = serde_json::from_value(json).unwrap();
        assert_eq!(claims.token_type(), TokenType::Refresh);
        let TokenClaims::Refresh(refresh) = claims else {
            panic!("expected refresh claims");
        };
        assert_eq!(refresh.refresh_token_id, "abc");
        assert_eq!(refresh.exp, 20);
    }

    #[test]
    fn unknown_token_type_is_rejected() {
        let json = serde_json::json!({
            "token_type": "id",
            "user_id": Uuid::nil(),
            "exp": 20,
            "iat": 10
        });

        assert!(serde_json::from_value::<TokenClaims>(json).is_err());
    }
}
