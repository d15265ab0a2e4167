pub mod config;
pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod in_memory;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod keys;
    pub mod secrets;
}

pub mod models {
    pub mod claims;
    pub mod session;
    pub mod user;
}

pub mod cache {
    pub mod redis_cache;
    pub mod store;
}

pub mod repositories {
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod rate_limiter;
    pub mod refresh;
    pub mod sessions;
    pub mod tokens;
}

pub mod handlers {
    pub mod auth;
    pub mod health;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
