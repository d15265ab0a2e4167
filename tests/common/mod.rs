#![allow(dead_code)]

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, response::Response};
use civic_gate::{
    config::Config,
    crypto::keys::SigningKeys,
    in_memory::{MemoryCache, MemorySessionStore, MemoryUserDirectory, hash_password},
    models::user::User,
    router::build_router,
    state::AppState,
};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

static KEYS: Lazy<SigningKeys> = Lazy::new(|| {
    SigningKeys::from_pem(
        include_bytes!("../fixtures/jwt_private.pem"),
        include_bytes!("../fixtures/jwt_public.pem"),
    )
    .unwrap()
});

// Argon2 is slow in debug builds, hash once per test binary.
static PASSWORD_HASH: Lazy<String> = Lazy::new(|| hash_password(PASSWORD).unwrap());

// Shared test context
pub struct TestContext {
    pub state: AppState,
    pub sessions: MemorySessionStore,
    pub cache: MemoryCache,
    pub users: MemoryUserDirectory,
    pub user: User,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let sessions = MemorySessionStore::new();
        let cache = MemoryCache::new();
        let users = MemoryUserDirectory::new();

        let user = User {
            id: Uuid::new_v4(),
            full_name: "Ana Souza".to_string(),
            username: "ana".to_string(),
            email: Some("ana@example.org".to_string()),
            password: PASSWORD_HASH.clone(),
            is_active: true,
        };
        users.insert(user.clone()).await;

        let state = AppState::from_parts(
            config,
            KEYS.clone(),
            Arc::new(sessions.clone()),
            Arc::new(cache.clone()),
            Arc::new(cache.clone()),
            Arc::new(users.clone()),
        );

        Self {
            state,
            sessions,
            cache,
            users,
            user,
        }
    }

    pub fn app(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app().oneshot(request).await.unwrap()
    }

    /// Logs in through the router and returns the JSON body.
    pub async fn login(&self) -> Value {
        let response = self
            .send(
                Request::post("/api/auth/login")
                    .header("content-type", "application/json")
                    .header("x-forwarded-for", "203.0.113.10")
                    .body(Body::from(
                        serde_json::json!({"username": "ana", "password": PASSWORD}).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), 200);
        body_json(response).await
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}
