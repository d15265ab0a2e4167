use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Liveness probe. Does not touch Postgres or Redis.
pub async fn health() -> impl IntoResponse {
    Json(Health { status: "ok" })
}
