use std::convert::Infallible;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::{auth::ACCESS_TOKEN_COOKIE, rate_limit::client_ip},
    models::{claims::AccessClaims, session::ClientInfo},
    services::{auth as auth_service, refresh::IssuedSession},
    state::AppState,
    validation::auth::{LoginRequest, RefreshRequest, validate_login},
};

/// Name of the cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
/// The refresh cookie is only sent to the auth endpoints.
const REFRESH_COOKIE_PATH: &str = "/api/auth";

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(ClientInfo {
            ip_address: Some(client_ip(&parts.headers, &parts.extensions)),
            user_agent,
        })
    }
}

/// The user fields echoed back after login.
#[derive(Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// The response payload for login and refresh.
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub session_id: Uuid,
    pub user: UserSummary,
}

/// The response payload for logout-style requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// One entry of the session listing.
#[derive(Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub current: bool,
}

/// Creates an HTTP-only, same-site-strict cookie living `max_age_secs`.
fn create_secure_cookie(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.set_path(path);
    cookie
}

fn expired_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_path(path);
    cookie
}

fn set_token_cookies(state: &AppState, cookies: &Cookies, issued: &IssuedSession) {
    let secure = state.config.is_production();
    cookies.add(create_secure_cookie(
        ACCESS_TOKEN_COOKIE,
        issued.tokens.access_token.clone(),
        "/",
        issued.tokens.access_expires_in,
        secure,
    ));
    cookies.add(create_secure_cookie(
        REFRESH_TOKEN_COOKIE,
        issued.tokens.refresh_token.clone(),
        REFRESH_COOKIE_PATH,
        issued.tokens.refresh_expires_in,
        secure,
    ));
}

fn clear_token_cookies(cookies: &Cookies) {
    cookies.remove(expired_cookie(ACCESS_TOKEN_COOKIE, "/"));
    cookies.remove(expired_cookie(REFRESH_TOKEN_COOKIE, REFRESH_COOKIE_PATH));
}

fn token_response(issued: IssuedSession) -> TokenResponse {
    let claims = issued.access_claims;
    TokenResponse {
        access_token: issued.tokens.access_token,
        refresh_token: issued.tokens.refresh_token,
        token_type: "Bearer",
        expires_in: issued.tokens.access_expires_in,
        refresh_expires_in: issued.tokens.refresh_expires_in,
        session_id: issued.session.id,
        user: UserSummary {
            id: claims.user_id,
            username: claims.username,
            email: claims.email,
            full_name: claims.full_name,
        },
    }
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt - Payload: {:?}", payload);
    validate_login(&payload)?;

    let user =
        auth_service::authenticate_user(state.users.as_ref(), &payload.username, payload.password)
            .await?;

    let issued = state.coordinator.issue(&user, client).await?;
    set_token_cookies(&state, &cookies, &issued);

    tracing::info!("✅ Session {} issued for user {}", issued.session.id, user.id);
    Ok(Json(token_response(issued)).into_response())
}

/// Exchanges a refresh token (cookie or JSON body) for a new pair.
pub async fn refresh(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Bytes,
) -> Result<Response> {
    let from_body = if body.is_empty() {
        None
    } else {
        sonic_rs::from_slice::<RefreshRequest>(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
            .refresh_token
    };

    let presented = from_body
        .filter(|token| !token.is_empty())
        .or_else(|| {
            cookies
                .get(REFRESH_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_string())
        })
        .ok_or_else(|| AppError::Authentication("Missing refresh token".to_string()))?;

    let issued = state.coordinator.refresh(&presented).await?;
    set_token_cookies(&state, &cookies, &issued);

    Ok(Json(token_response(issued)).into_response())
}

/// Revokes the session that made the request.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    state
        .ledger
        .revoke_by_id(&claims.user_id, &claims.session_id)
        .await?;
    clear_token_cookies(&cookies);

    tracing::info!("👋 User {} logged out", claims.user_id);
    Ok(Json(AuthResponse {
        success: true,
        message: "Logged out".to_string(),
    }))
}

/// Revokes every session of the requesting user.
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    let revoked = state.ledger.revoke_all(&claims.user_id).await?;
    clear_token_cookies(&cookies);

    Ok(Json(AuthResponse {
        success: true,
        message: format!("Revoked {} sessions", revoked),
    }))
}

/// Lists the requesting user's active sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse> {
    let sessions = state.ledger.list_active(&claims.user_id).await?;

    let summaries: Vec<SessionSummary> = sessions
        .into_iter()
        .map(|session| SessionSummary {
            current: session.id == claims.session_id,
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        })
        .collect();

    Ok(Json(summaries))
}

/// Revokes one of the requesting user's sessions.
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    cookies: Cookies,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    if !state.ledger.revoke_by_id(&claims.user_id, &session_id).await? {
        return Err(AppError::NotFound);
    }

    if session_id == claims.session_id {
        clear_token_cookies(&cookies);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Echoes the verified access claims.
pub async fn me(Extension(claims): Extension<AccessClaims>) -> impl IntoResponse {
    Json(claims)
}
