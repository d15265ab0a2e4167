use std::future::Future;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::refresh::RefreshError;
use crate::services::sessions::SessionError;
use crate::services::tokens::TokenError;

/// Failures of the durable store or the atomic cache store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A PostgreSQL error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// The connection pool could not hand out a client.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The call did not finish before its deadline.
    #[error("{0} call timed out")]
    Timeout(&'static str),

    /// The backend is known to be unreachable.
    #[error("{0} is unavailable")]
    Unavailable(&'static str),

    /// A cached value could not be decoded.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Runs a store call under a deadline so one slow backend cannot pin a handler.
pub async fn with_deadline<T, E, F>(
    timeout: Duration,
    backend: &'static str,
    call: F,
) -> std::result::Result<T, StoreError>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<StoreError>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(backend)),
    }
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A durable store or cache error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A token could not be verified.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// A session lookup or transition failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The refresh protocol rejected the request.
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

fn store_failure(e: &StoreError) -> (StatusCode, String) {
    tracing::error!("Store error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Storage backend error".to_string(),
    )
}

fn token_failure(e: &TokenError) -> (StatusCode, String) {
    tracing::warn!("Token rejected: {}", e);
    let message = match e {
        TokenError::Expired => "Token has expired",
        TokenError::InvalidSignature => "Invalid token signature",
        TokenError::WrongTokenType { .. } => "Wrong token type",
        TokenError::Malformed => "Invalid token",
        TokenError::Encoding(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            );
        }
    };
    (StatusCode::UNAUTHORIZED, message.to_string())
}

fn session_failure(e: &SessionError) -> (StatusCode, String) {
    let message = match e {
        SessionError::Store(inner) => return store_failure(inner),
        SessionError::NotFound => "Session not found",
        SessionError::Inactive => "Session is no longer active",
        SessionError::HashMismatch => "Refresh token reuse detected, session revoked",
        SessionError::ConcurrentRotation => "Refresh token was already used, retry with the latest token",
    };
    tracing::warn!("Session rejected: {}", e);
    (StatusCode::UNAUTHORIZED, message.to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Store(ref e) => store_failure(e),

            AppError::Token(ref e) => token_failure(e),

            AppError::Session(ref e) => session_failure(e),

            AppError::Refresh(ref e) => match e {
                RefreshError::InvalidRefreshToken(inner) => {
                    tracing::warn!("Refresh token rejected: {}", inner);
                    (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
                }
                RefreshError::Session(inner) => session_failure(inner),
                RefreshError::UserUnavailable => {
                    tracing::warn!("Refresh for unavailable user");
                    (StatusCode::UNAUTHORIZED, "Account is unavailable".to_string())
                }
                RefreshError::Minting(inner) => token_failure(inner),
                RefreshError::Store(inner) => store_failure(inner),
            },

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        error_body(status, &message)
    }
}

/// Renders `{"error": message}` with the given status.
pub fn error_body(status: StatusCode, message: &str) -> Response {
    let body = sonic_rs::to_string(&sonic_rs::json!({
        "error": message
    }))
    .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

    (
        status,
        [(http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_map_to_unauthorized() {
        for err in [
            TokenError::Expired,
            TokenError::InvalidSignature,
            TokenError::Malformed,
        ] {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn session_store_failure_is_internal_error() {
        let err = SessionError::Store(StoreError::Unavailable("redis"));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn concurrent_rotation_is_unauthorized() {
        let err = RefreshError::Session(SessionError::ConcurrentRotation);
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_resource_maps_to_404() {
        let response = AppError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deadline_reports_timeout() {
        let result: std::result::Result<(), StoreError> = with_deadline(
            Duration::from_millis(10),
            "postgres",
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), StoreError>(())
            },
        )
        .await;
        assert!(matches!(result, Err(StoreError::Timeout("postgres"))));
    }
}
