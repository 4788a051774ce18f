pub mod auth;
pub mod posts;
pub mod state;
pub mod middleware;

pub use state::AppState;
pub use middleware::{AuthUser, RateLimiter};

use axum::{
    Router,
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self as axum_middleware, Next},
    routing::{get, post, put},
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
    timeout::TimeoutLayer,
};
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// One route the server exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: &'static str,
    pub path: String,
    pub summary: &'static str,
}

/// Every route mounted by [`create_router`], for startup logging.
pub fn endpoints(prefix: &str) -> Vec<Endpoint> {
    let at = |method, path: &str, summary| Endpoint {
        method,
        path: format!("{}{}", prefix, path),
        summary,
    };

    vec![
        at("POST", "/users", "Register"),
        at("POST", "/users/login", "Login"),
        at("GET", "/users/me", "Current account (requires auth)"),
        at("GET", "/users", "List accounts"),
        at("GET", "/posts", "List posts"),
        at("GET", "/posts/{id}", "Get post"),
        at("POST", "/posts", "Create post (requires auth)"),
        at("PUT", "/posts/{id}", "Update post (owner only)"),
        at("DELETE", "/posts/{id}", "Delete post (owner only)"),
        Endpoint {
            method: "GET",
            path: "/api/health".to_string(),
            summary: "Health check",
        },
    ]
}

fn cors_layer(client_url: Option<&str>) -> Result<CorsLayer, AppError> {
    let Some(origin) = client_url else {
        return Ok(CorsLayer::permissive());
    };

    let origin: HeaderValue = origin
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid CLIENT_URL: {}", origin)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

/// Builds the API router. Routes requiring a session run behind
/// [`middleware::require_auth`]; the credential endpoints are rate limited.
pub fn create_router(state: AppState, rate_limiter: Arc<RateLimiter>) -> Result<Router, AppError> {
    let require_auth = axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth);
    let rate_limit = axum_middleware::from_fn(move |req: Request, next: Next| {
        let limiter = rate_limiter.clone();
        middleware::rate_limit_middleware(limiter, req, next)
    });

    let list_users = if state.config.public_user_directory {
        get(auth::list_users)
    } else {
        get(auth::list_users).route_layer(require_auth.clone())
    };

    let api = Router::new()
        // Accounts
        .route(
            "/users",
            post(auth::register).route_layer(rate_limit.clone()).merge(list_users),
        )
        .route("/users/login", post(auth::login).route_layer(rate_limit))
        .route("/users/me", get(auth::me).route_layer(require_auth.clone()))

        // Posts: reads are public, writes need a session (and ownership)
        .route(
            "/posts",
            get(posts::list_posts).merge(post(posts::create_post).route_layer(require_auth.clone())),
        )
        .route(
            "/posts/{id}",
            get(posts::get_post).merge(
                put(posts::update_post)
                    .delete(posts::delete_post)
                    .route_layer(require_auth),
            ),
        );

    let prefix = state.config.api_prefix.clone();
    let router = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&prefix, api)
    };

    Ok(router
        // Health check
        .route("/api/health", get(health))
        .layer(TimeoutLayer::new(Duration::from_secs(state.config.request_timeout_secs)))
        .layer(cors_layer(state.config.client_url.as_deref())?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
