use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{error::error_body, services::rate_limiter::RateDecision, state::AppState};

/// Extracts the client IP address from request headers and connection info.
///
/// Checks `X-Forwarded-For` (first hop), then `X-Real-IP`, then the socket
/// peer address, and falls back to "unknown".
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Extracts the client IP address of a request.
pub fn extract_client_ip(req: &Request<Body>) -> String {
    client_ip(req.headers(), req.extensions())
}

/// Sets `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at));
}

/// The 429 answer for a rejected decision, headers included.
pub fn rate_limit_response(decision: &RateDecision) -> Response {
    let retry_after = decision.retry_after_secs();
    let mut response = error_body(
        StatusCode::TOO_MANY_REQUESTS,
        &format!(
            "Too many requests. Please retry after {} seconds.",
            retry_after
        ),
    );

    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// A middleware that rate limits the unauthenticated auth endpoints per client IP.
pub async fn rate_limit_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&req);
    let decision = state.auth_limiter.allow(&ip).await;

    if !decision.allowed {
        tracing::warn!("🚫 Auth rate limit exceeded for {}", ip);
        return rate_limit_response(&decision);
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&req), "203.0.113.7");
    }

    #[test]
    fn real_ip_then_peer_then_unknown() {
        let req = Request::builder()
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&req), "198.51.100.2");

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 9], 4000))));
        assert_eq!(extract_client_ip(&req), "192.0.2.9");

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_client_ip(&req), "unknown");
    }

    #[test]
    fn rejection_carries_retry_after() {
        let decision = RateDecision {
            allowed: false,
            count: 4,
            limit: 3,
            remaining: 0,
            reset_at: chrono::Utc::now().timestamp() + 30,
        };
        let response = rate_limit_response(&decision);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-limit"], "3");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().contains_key(http::header::RETRY_AFTER));
    }
}
