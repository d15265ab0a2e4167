use garde::Validate;
use serde::Deserialize;

use crate::error::{AppError, Result};

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(length(min = 3, max = 255))]
    pub username: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[hidden]")
            .finish()
    }
}

/// The request payload for a refresh without the refresh cookie.
#[derive(Deserialize, Debug, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Validates a username's character set.
pub fn validate_username(username: &str) -> Result<()> {
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a login payload, flattening garde's report into one message.
pub fn validate_login(request: &LoginRequest) -> Result<()> {
    request
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;
    validate_username(&request.username)
}
