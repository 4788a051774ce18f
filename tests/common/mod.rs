#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use quillpost::api::{create_router, AppState, RateLimiter};
use quillpost::config::Config;
use quillpost::db;

pub const SECRET: &str = "integration-test-secret";

pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("JWT_SECRET", SECRET),
        ("DATABASE_URL", "sqlite::memory:"),
        ("DB_MAX_CONNECTIONS", "1"),
        ("DB_MIN_CONNECTIONS", "1"),
        ("ARGON2_MEMORY_KIB", "1024"),
        ("ARGON2_ITERATIONS", "1"),
        ("RATE_LIMIT_MAX_REQUESTS", "10000"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    Config::from_vars(|key| vars.get(key).cloned()).expect("test config")
}

pub async fn state_with(overrides: &[(&str, &str)]) -> AppState {
    let config = Arc::new(config_with(overrides));
    let pool = db::connect(&config).await.expect("connect");
    db::migrate(&pool).await.expect("migrate");
    AppState::new(pool, config).expect("state")
}

pub fn router(state: &AppState) -> Router {
    let limiter = Arc::new(RateLimiter::new(
        state.config.rate_limit_max_requests,
        state.config.rate_limit_window_secs,
    ));
    create_router(state.clone(), limiter).expect("router")
}

pub async fn app() -> (Router, AppState) {
    let state = state_with(&[]).await;
    (router(&state), state)
}

/// Serves the app on an ephemeral port and returns the API base URL.
pub async fn spawn_server(state: &AppState) -> String {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    format!("http://{}{}", addr, state.config.api_prefix)
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

/// Registers an account and returns `(id, token)`.
pub async fn register(app: &Router, name: &str, email: &str, password: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/users",
        None,
        Some(serde_json::json!({ "name": name, "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    (
        body["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}
