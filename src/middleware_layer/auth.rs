use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    middleware_layer::rate_limit::{apply_rate_limit_headers, rate_limit_response},
    state::AppState,
};

/// Name of the cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Extracts a bearer token from the `Authorization` header.
fn extract_bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Extracts the access token from the request cookies.
fn extract_cookie_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// A middleware that admits only requests with a live access token and
/// remaining rate budget.
///
/// The header wins over the cookie. On success the verified `AccessClaims`
/// are available to handlers as an extension and the response carries the
/// rate-limit headers.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let Some(token) = extract_bearer_token(&request).or_else(|| extract_cookie_token(&cookies))
    else {
        tracing::debug!("❌ No access token presented");
        return AppError::Authentication("Missing access token".to_string()).into_response();
    };

    let claims = match state.codec.verify_access(&token) {
        Ok(claims) => claims,
        Err(e) => return AppError::Token(e).into_response(),
    };

    if !state
        .ledger
        .is_member(&claims.user_id, &claims.session_id)
        .await
    {
        tracing::warn!(
            "❌ Session {} of user {} is not active",
            claims.session_id,
            claims.user_id
        );
        return AppError::Authentication("Session is no longer active".to_string())
            .into_response();
    }

    let decision = state.api_limiter.allow(&claims.user_id.to_string()).await;
    if !decision.allowed {
        tracing::warn!("🚫 Rate limit exceeded for user {}", claims.user_id);
        return rate_limit_response(&decision);
    }

    tracing::debug!("✅ User authenticated: {}", claims.user_id);
    request.extensions_mut().insert(claims);

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme() {
        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);

        let req = Request::builder()
            .header(header::AUTHORIZATION, "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);
    }
}
